//! Flush-time fan-out of change events into delivery tasks.
//!
//! At the end of a unit of work the owner drains its
//! [`EventQueue`](crate::queue::EventQueue) and calls
//! [`EventDispatcher::flush`]. The dispatcher runs each configured
//! pipeline stage over the whole batch; the built-in [`RuleProcessor`]
//! stage resolves matching rules per event and submits one
//! [`DeliveryTask`] per (event, rule) pair to the task transport.
//!
//! Failures are contained: a failing stage does not stop later
//! stages, and a failing rule does not stop the remaining rules or
//! events. Nothing raised here ever reaches the request path that
//! produced the events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use crate::error::Result;
use crate::rules::{RuleCache, RuleStore};
use crate::taskqueue::{TaskQueue, DEFAULT_QUEUE};
use crate::types::{ChangeEvent, DeliveryTask, EventRule, TaskRetry};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Dispatch configuration, read from global application settings.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// Processor identifier → queue name. Unmapped processors go to
    /// [`DEFAULT_QUEUE`].
    pub queue_mappings: HashMap<String, String>,

    /// Transport retry policy attached to every submitted task.
    pub retry: TaskRetry,
}

impl DispatcherConfig {
    pub fn queue_for(&self, processor: &str) -> &str {
        self.queue_mappings.get(processor).map(String::as_str).unwrap_or(DEFAULT_QUEUE)
    }
}

/// One stage of the events pipeline.
///
/// Stages run in registration order over every flushed batch. Each is
/// independently fallible; a stage error is logged and the next stage
/// still runs.
#[async_trait]
pub trait EventPipelineStage: Send + Sync {
    /// Stable stage name for logs.
    fn name(&self) -> &str;

    async fn process(&self, events: &[ChangeEvent]) -> Result<()>;
}

/// Built-in stage: match rules and submit delivery tasks.
pub struct RuleProcessor {
    store: Arc<dyn RuleStore>,
    task_queue: Arc<dyn TaskQueue>,
    config: DispatcherConfig,
}

impl RuleProcessor {
    pub fn new(
        store: Arc<dyn RuleStore>,
        task_queue: Arc<dyn TaskQueue>,
        config: DispatcherConfig,
    ) -> Self {
        Self { store, task_queue, config }
    }

    /// Build and submit the delivery task for one (event, rule) pair.
    async fn submit(&self, event: &ChangeEvent, rule: &EventRule) -> Result<()> {
        rule.validate()?;

        let processor = rule.action.kind();
        let queue = self.config.queue_for(processor);

        let task = DeliveryTask {
            rule: rule.clone(),
            model_name: event.object_type.model().to_string(),
            event: event.action,
            data: event.data.clone(),
            snapshots: event.snapshots.clone(),
            timestamp: Utc::now(),
            username: event.username.clone(),
            request_id: Some(event.request_id),
            retry: self.config.retry,
        };

        debug!(
            rule = %rule.name,
            processor,
            queue,
            model = %task.model_name,
            event = event.action.label(),
            "submitting delivery task"
        );
        self.task_queue.submit(queue, processor, task).await
    }
}

#[async_trait]
impl EventPipelineStage for RuleProcessor {
    fn name(&self) -> &str {
        "rules"
    }

    async fn process(&self, events: &[ChangeEvent]) -> Result<()> {
        // Rule lookups are memoized for this flush only.
        let mut cache = RuleCache::new(self.store.as_ref());

        for event in events {
            let rules = cache.rules_for(&event.object_type, event.action).await?;

            for rule in rules.iter() {
                // A broken rule must not abort the rest of the batch.
                if let Err(err) = self.submit(event, rule).await {
                    metric_inc("events.task.submit_failure");
                    error!(
                        rule = %rule.name,
                        model = %event.object_type.model(),
                        event = event.action.label(),
                        error = %err,
                        "failed to submit delivery task"
                    );
                } else {
                    metric_inc("events.task.submitted");
                }
            }
        }
        Ok(())
    }
}

/// Runs the events pipeline over each flushed batch.
pub struct EventDispatcher {
    stages: Vec<Arc<dyn EventPipelineStage>>,
}

impl EventDispatcher {
    /// Dispatcher with the standard pipeline: rule matching and task
    /// submission only.
    pub fn new(
        store: Arc<dyn RuleStore>,
        task_queue: Arc<dyn TaskQueue>,
        config: DispatcherConfig,
    ) -> Self {
        Self { stages: vec![Arc::new(RuleProcessor::new(store, task_queue, config))] }
    }

    /// Dispatcher with a custom stage list, in execution order.
    pub fn with_stages(stages: Vec<Arc<dyn EventPipelineStage>>) -> Self {
        Self { stages }
    }

    /// Append a stage after the existing ones.
    pub fn push_stage(&mut self, stage: Arc<dyn EventPipelineStage>) {
        self.stages.push(stage);
    }

    /// Run every pipeline stage over the flushed batch.
    ///
    /// Stage failures are logged and isolated; this method never
    /// returns an error into the producing request path.
    pub async fn flush(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }

        for stage in &self.stages {
            if let Err(err) = stage.process(events).await {
                metric_inc("events.pipeline.stage_failure");
                error!(stage = stage.name(), error = %err, "events pipeline stage failed");
            }
        }
        metric_inc("events.flush.completed");
    }
}
