//! Transport seam between the dispatcher and the delivery workers.
//!
//! The real task queue (with its retry scheduling and worker
//! processes) is an external collaborator; this module only defines
//! the submission contract plus an in-memory implementation used by
//! tests and single-process embedded deployments.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::types::DeliveryTask;

/// Processor identifier for webhook delivery tasks.
pub const WEBHOOK_PROCESSOR: &str = "webhook";

/// Processor identifier for script execution tasks.
pub const SCRIPT_PROCESSOR: &str = "script";

/// Queue name used when no mapping is configured for a processor.
pub const DEFAULT_QUEUE: &str = "default";

/// One task handed to the transport, addressed to a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Which consumer handles the task ([`WEBHOOK_PROCESSOR`] or
    /// [`SCRIPT_PROCESSOR`]).
    pub processor: String,
    pub task: DeliveryTask,
}

/// Asynchronous task transport.
///
/// Submission is a fire-and-forget handoff: implementations must not
/// perform delivery work inline, so the producer side never blocks on
/// network I/O.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit a task onto the named queue for the given processor.
    async fn submit(&self, queue: &str, processor: &str, task: DeliveryTask) -> Result<()>;
}

/// In-memory task queue for tests and embedded single-process use.
///
/// Holds submissions per queue name in FIFO order. Retry scheduling is
/// the caller's concern, as it would be with a real transport.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    queues: Mutex<HashMap<String, VecDeque<TaskSubmission>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next submission from a queue, if any.
    pub async fn pop(&self, queue: &str) -> Option<TaskSubmission> {
        let mut queues = self.queues.lock().await;
        queues.get_mut(queue)?.pop_front()
    }

    /// Take every submission currently on a queue.
    pub async fn drain(&self, queue: &str) -> Vec<TaskSubmission> {
        let mut queues = self.queues.lock().await;
        queues.remove(queue).map(Vec::from).unwrap_or_default()
    }

    pub async fn len(&self, queue: &str) -> usize {
        let queues = self.queues.lock().await;
        queues.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, queue: &str, processor: &str, task: DeliveryTask) -> Result<()> {
        let mut queues = self.queues.lock().await;
        queues
            .entry(queue.to_string())
            .or_default()
            .push_back(TaskSubmission { processor: processor.to_string(), task });
        Ok(())
    }
}
