use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::conditions::ConditionSet;

/// Serialized representation of a tracked object.
///
/// Producers snapshot object state into a semantic JSON document; the
/// core never interprets it beyond condition lookups and templating.
pub type Document = Value;

/// Identifier for a tracked object type, in `app.model` form
/// (e.g. `dcim.site`).
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of type identifiers with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectTypeId(pub String);

impl ObjectTypeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The bare model name, without the application prefix.
    pub fn model(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

/// Primary key of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Unique identifier for an event rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub u64);

/// Unique identifier for a webhook definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(pub u64);

/// Kind of change that produced an event.
///
/// Closed set: every action maps to exactly one trigger flag on
/// [`TriggerSet`], so there is no "unknown action" path at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Create,
    Update,
    Delete,
    JobStart,
    JobEnd,
}

impl EventAction {
    /// Human-readable label exposed to templates as `event`.
    pub fn label(self) -> &'static str {
        match self {
            EventAction::Create => "created",
            EventAction::Update => "updated",
            EventAction::Delete => "deleted",
            EventAction::JobStart => "job_started",
            EventAction::JobEnd => "job_ended",
        }
    }
}

/// Before/after state captured alongside a change.
///
/// `prechange` is absent on create, `postchange` absent on delete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshots {
    pub prechange: Option<Document>,
    pub postchange: Option<Document>,
}

impl Snapshots {
    pub fn is_empty(&self) -> bool {
        self.prechange.is_none() && self.postchange.is_none()
    }
}

/// One recorded mutation, accumulated by the producer during a unit of
/// work and consumed by the dispatcher at flush time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub object_type: ObjectTypeId,
    pub object_id: ObjectId,
    pub action: EventAction,

    /// Serialized state of the object at mutation time.
    pub data: Document,

    pub snapshots: Snapshots,

    /// User responsible for the change.
    pub username: String,

    /// Correlates all events produced by one unit of work.
    pub request_id: Uuid,
}

/// Trigger flags controlling which actions a rule reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSet {
    pub on_create: bool,
    pub on_update: bool,
    pub on_delete: bool,
    pub on_job_start: bool,
    pub on_job_end: bool,
}

impl TriggerSet {
    /// Whether the flag for `action` is set.
    pub fn matches(&self, action: EventAction) -> bool {
        match action {
            EventAction::Create => self.on_create,
            EventAction::Update => self.on_update,
            EventAction::Delete => self.on_delete,
            EventAction::JobStart => self.on_job_start,
            EventAction::JobEnd => self.on_job_end,
        }
    }

    pub fn any(&self) -> bool {
        self.on_create || self.on_update || self.on_delete || self.on_job_start || self.on_job_end
    }
}

/// HTTP method used for webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Destination for webhook delivery.
///
/// A `Webhook` describes *where* and *how* a matching event should be
/// delivered. It is a pure configuration object with no internal state;
/// definitions live in external storage and are read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub name: String,

    /// Target URL; rendered as a template against the event context.
    pub payload_url: String,

    pub http_method: HttpMethod,
    pub http_content_type: String,

    /// Extra headers, one `Name: value` per line after rendering.
    pub additional_headers: String,

    /// Request body template. Empty means "send the JSON-serialized
    /// event context".
    pub body_template: String,

    /// HMAC key. Empty disables signing.
    pub secret: String,

    /// Whether to verify the server's TLS certificate.
    pub ssl_verification: bool,

    /// Optional CA bundle (PEM) overriding the system trust store.
    pub ca_file_path: Option<String>,
}

impl Webhook {
    /// Create a webhook with default delivery settings.
    ///
    /// Defaults:
    /// - method: POST
    /// - content type: application/json
    /// - TLS verification: enabled
    pub fn new(id: WebhookId, name: impl Into<String>, payload_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            payload_url: payload_url.into(),
            http_method: HttpMethod::Post,
            http_content_type: "application/json".to_string(),
            additional_headers: String::new(),
            body_template: String::new(),
            secret: String::new(),
            ssl_verification: true,
            ca_file_path: None,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.http_method = method;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.http_content_type = content_type.into();
        self
    }

    pub fn with_additional_headers(mut self, headers: impl Into<String>) -> Self {
        self.additional_headers = headers.into();
        self
    }

    pub fn with_body_template(mut self, template: impl Into<String>) -> Self {
        self.body_template = template.into();
        self
    }

    /// Set a secret for HMAC signing of the request body.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_ssl_verification(mut self, verify: bool) -> Self {
        self.ssl_verification = verify;
        self
    }

    pub fn with_ca_file(mut self, path: impl Into<String>) -> Self {
        self.ca_file_path = Some(path.into());
        self
    }
}

/// Reference to a user script invoked by a rule.
///
/// Execution semantics are external; only the dispatch contract is
/// modeled here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub module: String,
    pub name: String,
}

/// Action taken when a rule matches, resolved once at rule load.
///
/// The variant is closed: a rule cannot reference an action kind the
/// dispatcher does not understand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Webhook(Webhook),
    Script(ScriptRef),
}

impl ActionTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            ActionTarget::Webhook(_) => "webhook",
            ActionTarget::Script(_) => "script",
        }
    }
}

/// Persistent definition mapping trigger conditions to an action.
///
/// Read-only from the core's perspective; loaded through a
/// [`RuleStore`](crate::rules::RuleStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRule {
    pub id: RuleId,

    /// Unique rule name, used in logs and diagnostics.
    pub name: String,

    pub enabled: bool,

    /// Object types this rule applies to.
    pub content_types: HashSet<ObjectTypeId>,

    pub triggers: TriggerSet,

    /// Optional condition gate evaluated against the event data.
    /// Absent means the rule matches unconditionally.
    pub conditions: Option<ConditionSet>,

    pub action: ActionTarget,
}

impl EventRule {
    pub fn new(id: RuleId, name: impl Into<String>, action: ActionTarget) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            content_types: HashSet::new(),
            triggers: TriggerSet::default(),
            conditions: None,
            action,
        }
    }

    pub fn with_content_type(mut self, object_type: ObjectTypeId) -> Self {
        self.content_types.insert(object_type);
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerSet) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionSet) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this rule applies to a change of `object_type` with the
    /// given action: the rule is enabled, covers the type, and has the
    /// matching trigger flag set.
    pub fn applies_to(&self, object_type: &ObjectTypeId, action: EventAction) -> bool {
        self.enabled && self.triggers.matches(action) && self.content_types.contains(object_type)
    }

    /// Check structural invariants: a rule must have a name and at
    /// least one trigger flag set.
    pub fn validate(&self) -> Result<(), crate::error::EventError> {
        if self.name.is_empty() {
            return Err(crate::error::EventError::configuration(
                "event rule name must not be empty",
            ));
        }
        if !self.triggers.any() {
            return Err(crate::error::EventError::configuration(format!(
                "event rule '{}' has no trigger flags set",
                self.name
            )));
        }
        Ok(())
    }
}

/// Transport-level retry policy attached to every delivery task.
///
/// Retries are scheduled by the external task queue; the worker itself
/// never loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRetry {
    /// Maximum re-attempts after the initial one.
    pub max: u32,

    /// Delay between attempts, in seconds.
    pub interval_secs: u64,
}

impl Default for TaskRetry {
    fn default() -> Self {
        Self { max: 3, interval_secs: 60 }
    }
}

/// A unit of work consumed by delivery workers.
///
/// One task is created per (event, matching rule) pair and consumed by
/// exactly one worker invocation attempt; the transport may re-run it
/// per [`TaskRetry`] on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    /// Snapshot of the rule that matched.
    pub rule: EventRule,

    /// Bare model name of the changed object.
    pub model_name: String,

    pub event: EventAction,

    /// Serialized object state the conditions and templates see.
    pub data: Document,

    pub snapshots: Snapshots,

    pub timestamp: DateTime<Utc>,

    pub username: String,

    /// Absent for events not tied to a request (e.g. job transitions).
    pub request_id: Option<Uuid>,

    pub retry: TaskRetry,
}
