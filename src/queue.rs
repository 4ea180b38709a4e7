//! Producer-side accumulation of change events.
//!
//! One [`EventQueue`] lives for the duration of one unit of work (a
//! web request, a job run). Mutations append events in order; after
//! the unit of work commits, the owner drains the queue and hands the
//! batch to the [`EventDispatcher`](crate::dispatcher::EventDispatcher).
//! Nothing here touches rules or the network.

use uuid::Uuid;

use crate::registry::FeatureRegistry;
use crate::types::{ChangeEvent, Document, EventAction, ObjectId, ObjectTypeId, Snapshots};

/// A tracked object that can be serialized into a change event.
///
/// Implemented by the application's model layer; the serialization
/// format is owned by the caller, the core only transports it.
pub trait TrackedObject {
    fn object_type(&self) -> ObjectTypeId;

    fn object_id(&self) -> ObjectId;

    /// Serialized representation used for condition evaluation and
    /// templating.
    fn to_document(&self) -> Document;

    /// State captured before the mutation, when the caller recorded
    /// one. Absent on create.
    fn prechange_snapshot(&self) -> Option<Document> {
        None
    }
}

/// Ordered accumulation of change events for one unit of work.
///
/// Never shared across concurrent requests; no deduplication is
/// performed.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<ChangeEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change event in insertion order.
    pub fn append(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    /// Atomically take and empty the accumulated sequence.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Capture before/after snapshots for an object mutation.
///
/// `postchange` is skipped on delete; `prechange` is whatever the
/// caller recorded before mutating (absent on create).
fn get_snapshots(instance: &dyn TrackedObject, action: EventAction) -> Snapshots {
    let postchange = if action == EventAction::Delete {
        None
    } else {
        Some(instance.to_document())
    };

    Snapshots { prechange: instance.prechange_snapshot(), postchange }
}

/// Append a serialized representation of a created/updated/deleted
/// object for dispatch once the unit of work completes.
///
/// No-op if the object's type is not registered as event-capable.
pub fn enqueue_object(
    queue: &mut EventQueue,
    registry: &FeatureRegistry,
    instance: &dyn TrackedObject,
    username: &str,
    request_id: Uuid,
    action: EventAction,
) {
    let object_type = instance.object_type();
    if !registry.supports_events(&object_type) {
        return;
    }

    queue.append(ChangeEvent {
        object_type,
        object_id: instance.object_id(),
        action,
        data: instance.to_document(),
        snapshots: get_snapshots(instance, action),
        username: username.to_string(),
        request_id,
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Site {
        id: u64,
        name: &'static str,
        previous: Option<Document>,
    }

    impl TrackedObject for Site {
        fn object_type(&self) -> ObjectTypeId {
            ObjectTypeId::new("dcim.site")
        }

        fn object_id(&self) -> ObjectId {
            ObjectId(self.id)
        }

        fn to_document(&self) -> Document {
            json!({"id": self.id, "name": self.name})
        }

        fn prechange_snapshot(&self) -> Option<Document> {
            self.previous.clone()
        }
    }

    fn site_registry() -> FeatureRegistry {
        [ObjectTypeId::new("dcim.site")].into_iter().collect()
    }

    #[test]
    fn append_and_drain_preserve_order() {
        let registry = site_registry();
        let mut queue = EventQueue::new();
        let request_id = Uuid::new_v4();

        for (id, name) in [(1, "dc1"), (2, "dc2"), (3, "dc3")] {
            let site = Site { id, name, previous: None };
            enqueue_object(&mut queue, &registry, &site, "admin", request_id, EventAction::Create);
        }

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events.iter().map(|e| e.object_id.0).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn unregistered_type_is_a_no_op() {
        let registry = FeatureRegistry::new();
        let mut queue = EventQueue::new();
        let site = Site { id: 1, name: "dc1", previous: None };

        enqueue_object(&mut queue, &registry, &site, "admin", Uuid::new_v4(), EventAction::Create);
        assert!(queue.is_empty());
    }

    #[test]
    fn snapshots_follow_action_kind() {
        let registry = site_registry();
        let mut queue = EventQueue::new();
        let request_id = Uuid::new_v4();

        let created = Site { id: 1, name: "dc1", previous: None };
        enqueue_object(&mut queue, &registry, &created, "admin", request_id, EventAction::Create);

        let updated = Site { id: 1, name: "dc1-renamed", previous: Some(json!({"name": "dc1"})) };
        enqueue_object(&mut queue, &registry, &updated, "admin", request_id, EventAction::Update);

        let deleted = Site { id: 1, name: "dc1-renamed", previous: Some(json!({"name": "dc1-renamed"})) };
        enqueue_object(&mut queue, &registry, &deleted, "admin", request_id, EventAction::Delete);

        let events = queue.drain();

        assert!(events[0].snapshots.prechange.is_none());
        assert!(events[0].snapshots.postchange.is_some());

        assert!(events[1].snapshots.prechange.is_some());
        assert!(events[1].snapshots.postchange.is_some());

        assert!(events[2].snapshots.prechange.is_some());
        assert!(events[2].snapshots.postchange.is_none());
    }

    #[test]
    fn events_carry_user_and_request_context() {
        let registry = site_registry();
        let mut queue = EventQueue::new();
        let request_id = Uuid::new_v4();
        let site = Site { id: 7, name: "edge", previous: None };

        enqueue_object(&mut queue, &registry, &site, "operator", request_id, EventAction::Update);

        let events = queue.drain();
        assert_eq!(events[0].username, "operator");
        assert_eq!(events[0].request_id, request_id);
        assert_eq!(events[0].action, EventAction::Update);
    }
}
