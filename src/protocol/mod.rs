//! Inbound message decoding and dispatch.
//!
//! Frames arrive as text carrying a JSON object with a `type` discriminant.
//!
//! # Protocol Overview
//!
//! | Step | Failure | Effect on connection |
//! |------|---------|----------------------|
//! | Parse JSON object | Malformed frame | None, frame dropped |
//! | Validate `type` | Unknown kind | None, frame dropped |
//! | Route to handler | - | Handler invoked in arrival order |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | [`InboundMessage`] and frame decoding |
//! | `dispatch` | [`Dispatcher`] routing by kind |
//! | `workflow` | Workflow execution event vocabulary |

// ============================================================================
// Submodules
// ============================================================================

/// Kind-based routing.
pub mod dispatch;

/// Inbound message type.
pub mod message;

/// Workflow execution events.
pub mod workflow;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::{DispatchOutcome, Dispatcher, MessageHandler};
pub use message::{DISCRIMINANT_FIELD, InboundMessage};
pub use workflow::{WORKFLOW_EVENT_KINDS, WorkflowEvent};
