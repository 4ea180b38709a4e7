//! Change-driven event rule matching and webhook delivery.
//!
//! This crate is the event dispatch subsystem of an asset-management
//! application: whenever a tracked object is created, updated, or
//! deleted (or a job starts or ends), it decides which registered
//! rules apply, evaluates optional conditions against the serialized
//! object state, and hands matching actions (a signed outbound webhook
//! call or a user script invocation) to an asynchronous task
//! transport, without blocking the request that made the change.
//!
//! ## Guarantees
//! - Producer-side dispatch never blocks on network I/O
//! - At-least-once delivery (transport-level retries)
//! - Per-rule and per-stage failure isolation during a flush
//! - Signed request bodies when a webhook secret is configured
//!
//! ## Non-Guarantees
//! - Exactly-once delivery (idempotency is the receiver's job)
//! - Ordering across unrelated events
//! - Rule/webhook persistence (bring a [`RuleStore`])
//! - Task transport durability (bring a [`TaskQueue`])
//!
//! ## Pipeline
//!
//! Mutations append [`ChangeEvent`]s to an [`EventQueue`] scoped to
//! one unit of work. After commit, the owner drains the queue into
//! [`EventDispatcher::flush`], which matches rules (memoized per
//! flush via [`RuleCache`]) and submits one [`DeliveryTask`] per
//! (event, rule) pair. A [`WebhookWorker`] consumes each task:
//! condition check, template rendering, HMAC signing, HTTP send.

mod conditions;
mod dispatcher;
mod error;
mod queue;
mod registry;
mod rules;
mod signing;
mod taskqueue;
mod templates;
mod types;
mod worker;

pub use conditions::{evaluate, Condition, ConditionOp, ConditionSet};
pub use dispatcher::{DispatcherConfig, EventDispatcher, EventPipelineStage, RuleProcessor};
pub use error::{DeliveryOutcome, EventError, Result};
pub use queue::{enqueue_object, EventQueue, TrackedObject};
pub use registry::FeatureRegistry;
pub use rules::{InMemoryRuleStore, RuleCache, RuleStore};
pub use signing::{generate_signature, verify_signature, SIGNATURE_HEADER};
pub use taskqueue::{
    InMemoryTaskQueue, TaskQueue, TaskSubmission, DEFAULT_QUEUE, SCRIPT_PROCESSOR,
    WEBHOOK_PROCESSOR,
};
pub use templates::TemplateRenderer;
pub use types::{
    ActionTarget, ChangeEvent, DeliveryTask, Document, EventAction, EventRule, HttpMethod,
    ObjectId, ObjectTypeId, RuleId, ScriptRef, Snapshots, TaskRetry, TriggerSet, Webhook,
    WebhookId,
};
pub use worker::{WebhookWorker, WorkerConfig};
