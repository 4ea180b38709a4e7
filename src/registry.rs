use std::collections::HashSet;

use crate::types::ObjectTypeId;

/// Capability table of object types that participate in event dispatch.
///
/// The application registers each event-capable type once at startup
/// and passes the registry into [`enqueue_object`]
/// (crate::queue::enqueue_object); changes to unregistered types are
/// silently ignored. Injected as a collaborator, never global state.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    event_capable: HashSet<ObjectTypeId>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an object type as event-capable.
    pub fn register(&mut self, object_type: ObjectTypeId) {
        self.event_capable.insert(object_type);
    }

    pub fn supports_events(&self, object_type: &ObjectTypeId) -> bool {
        self.event_capable.contains(object_type)
    }
}

impl FromIterator<ObjectTypeId> for FeatureRegistry {
    fn from_iter<I: IntoIterator<Item = ObjectTypeId>>(iter: I) -> Self {
        Self { event_capable: iter.into_iter().collect() }
    }
}
