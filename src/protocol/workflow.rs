//! Workflow execution stream vocabulary.
//!
//! The workflow canvas subscribes to a per-execution stream and repaints
//! nodes as the backend reports progress.
//!
//! # Event Kinds
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `execution_started` | Run accepted and started |
//! | `node_started` | A node began executing |
//! | `node_completed` | A node produced output |
//! | `node_failed` | A node raised an error |
//! | `execution_completed` | Run finished |
//! | `execution_failed` | Run aborted |
//! | `log` | Free-form log line |
//! | `heartbeat` | Keep-alive, no body |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use super::message::InboundMessage;

// ============================================================================
// Constants
// ============================================================================

/// Every kind the workflow stream emits.
pub const WORKFLOW_EVENT_KINDS: &[&str] = &[
    "execution_started",
    "node_started",
    "node_completed",
    "node_failed",
    "execution_completed",
    "execution_failed",
    "log",
    "heartbeat",
];

// ============================================================================
// WorkflowEvent
// ============================================================================

/// Typed view of a workflow stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// Run started.
    ExecutionStarted {
        /// Execution ID.
        execution_id: String,
        /// Workflow the run belongs to.
        workflow_id: String,
    },

    /// Node began executing.
    NodeStarted {
        /// Execution ID.
        execution_id: String,
        /// Canvas node ID.
        node_id: String,
    },

    /// Node finished with output.
    NodeCompleted {
        /// Execution ID.
        execution_id: String,
        /// Canvas node ID.
        node_id: String,
        /// Node output.
        output: Value,
        /// Wall time in milliseconds.
        duration_ms: u64,
    },

    /// Node raised an error.
    NodeFailed {
        /// Execution ID.
        execution_id: String,
        /// Canvas node ID.
        node_id: String,
        /// Error message.
        error: String,
    },

    /// Run finished.
    ExecutionCompleted {
        /// Execution ID.
        execution_id: String,
        /// Final status reported by the backend.
        status: String,
        /// Wall time in milliseconds.
        duration_ms: u64,
    },

    /// Run aborted.
    ExecutionFailed {
        /// Execution ID.
        execution_id: String,
        /// Error message.
        error: String,
    },

    /// Log line.
    Log {
        /// Log level.
        level: String,
        /// Log text.
        message: String,
        /// Node that emitted the line, if any.
        node_id: Option<String>,
    },

    /// Keep-alive.
    Heartbeat,

    /// Kind outside the workflow vocabulary.
    Unknown {
        /// Message kind.
        kind: String,
        /// Full message body.
        body: Value,
    },
}

impl WorkflowEvent {
    /// Parses a decoded message into a typed workflow event.
    #[must_use]
    pub fn parse(message: &InboundMessage) -> Self {
        match message.kind.as_str() {
            "execution_started" => Self::ExecutionStarted {
                execution_id: message.get_string("execution_id"),
                workflow_id: message.get_string("workflow_id"),
            },

            "node_started" => Self::NodeStarted {
                execution_id: message.get_string("execution_id"),
                node_id: message.get_string("node_id"),
            },

            "node_completed" => Self::NodeCompleted {
                execution_id: message.get_string("execution_id"),
                node_id: message.get_string("node_id"),
                output: message.get_value("output"),
                duration_ms: message.get_u64("duration_ms"),
            },

            "node_failed" => Self::NodeFailed {
                execution_id: message.get_string("execution_id"),
                node_id: message.get_string("node_id"),
                error: message.get_string("error"),
            },

            "execution_completed" => Self::ExecutionCompleted {
                execution_id: message.get_string("execution_id"),
                status: message
                    .get_optional_string("status")
                    .unwrap_or_else(|| "completed".to_string()),
                duration_ms: message.get_u64("duration_ms"),
            },

            "execution_failed" => Self::ExecutionFailed {
                execution_id: message.get_string("execution_id"),
                error: message.get_string("error"),
            },

            "log" => Self::Log {
                level: message
                    .get_optional_string("level")
                    .unwrap_or_else(|| "info".to_string()),
                message: message.get_string("message"),
                node_id: message.get_optional_string("node_id"),
            },

            "heartbeat" => Self::Heartbeat,

            _ => Self::Unknown {
                kind: message.kind.clone(),
                body: Value::Object(message.body.clone()),
            },
        }
    }

    /// Returns `true` if the event ends the execution.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted { .. } | Self::ExecutionFailed { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
