//! Error taxonomy for the dispatch and delivery pipeline.
//!
//! The split that matters is terminal vs. retryable: a broken template
//! or misconfigured rule cannot be fixed by re-running the task, while
//! a transport failure can. [`EventError::is_retryable`] is what the
//! task transport consults before scheduling a re-attempt.

use thiserror::Error;

/// Result type alias for dispatch and delivery operations.
pub type Result<T> = std::result::Result<T, EventError>;

/// Errors raised while matching rules, building tasks, or delivering
/// webhooks.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// A rule or webhook definition is unusable (missing triggers,
    /// wrong action kind for the consumer, unresolvable target).
    /// Fatal for that rule's task only; the rest of the batch proceeds.
    #[error("configuration error: {message}")]
    Configuration {
        message: String,
    },

    /// Header, body, or URL rendering failed. Terminal for the task:
    /// a retry cannot fix a structurally broken template.
    #[error("template rendering failed: {message}")]
    Template {
        message: String,
    },

    /// Request construction or send failure, or a non-2xx response.
    /// Retryable; the external task queue re-attempts up to its bound.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
    },

    /// An event-processing pipeline stage failed. Isolated per stage:
    /// remaining stages still run on the same batch.
    #[error("pipeline stage '{stage}' failed: {message}")]
    PipelineStage {
        stage: String,
        message: String,
    },
}

impl EventError {
    /// Creates a configuration error from a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a template error from a message.
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template { message: message.into() }
    }

    /// Creates a transport error with no HTTP status (request never
    /// completed).
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), status: None }
    }

    /// Creates a transport error from a non-2xx HTTP response.
    pub fn transport_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), status: Some(status) }
    }

    /// Creates a pipeline stage error.
    pub fn pipeline_stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PipelineStage { stage: stage.into(), message: message.into() }
    }

    /// Whether the external task queue should re-attempt the task.
    ///
    /// Only transport failures are retryable. Configuration and
    /// template errors are structural; re-running the task would yield
    /// the same failure and waste worker capacity.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EventError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::transport(format!("request timed out: {err}"))
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<minijinja::Error> for EventError {
    fn from(err: minijinja::Error) -> Self {
        Self::template(err.to_string())
    }
}

/// Final outcome of one worker invocation that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The rule's condition evaluated false; nothing was sent. The
    /// task is consumed and must not be retried.
    Skipped,

    /// The endpoint answered 2xx.
    Delivered {
        status: u16,
        /// Human-readable success message recorded with the task.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(EventError::transport("connection refused").is_retryable());
        assert!(EventError::transport_status(503, "unavailable").is_retryable());

        assert!(!EventError::configuration("bad rule").is_retryable());
        assert!(!EventError::template("missing field").is_retryable());
        assert!(!EventError::pipeline_stage("rules", "boom").is_retryable());
    }

    #[test]
    fn transport_status_extracted() {
        assert_eq!(EventError::transport_status(404, "not found").status(), Some(404));
        assert_eq!(EventError::transport("no response").status(), None);
        assert_eq!(EventError::template("oops").status(), None);
    }

    #[test]
    fn error_display_format() {
        let err = EventError::pipeline_stage("rules", "store unavailable");
        assert_eq!(err.to_string(), "pipeline stage 'rules' failed: store unavailable");

        let err = EventError::template("undefined value");
        assert_eq!(err.to_string(), "template rendering failed: undefined value");
    }
}
