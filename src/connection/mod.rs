//! Connection lifecycle controller.
//!
//! A [`Connection`] owns at most one live transport handle and at most one
//! pending reconnect timer. Lost handles are retried with capped,
//! jittered exponential backoff until the attempt budget runs out.
//!
//! # State Machine
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Idle / Closed / Failed | `connect()` | Connecting |
//! | Connecting | handle opened | Open (attempts reset) |
//! | Connecting / Open | error or close, budget left | Failed, timer armed |
//! | Failed | timer fired | Connecting |
//! | Connecting / Open | error or close, budget spent | Closed |
//! | any | `disconnect()` | Closed |
//! | any | `reset()` | Idle |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ConnectionBuilder`] fluent configuration |
//! | `callbacks` | [`Callbacks`] consumer hooks |
//! | `core` | [`Connection`] controller |
//! | `session` | Background session task (internal) |
//! | `state` | [`ConnectionState`], [`ConnectionSnapshot`] |

// ============================================================================
// Submodules
// ============================================================================

/// Connection builder.
pub mod builder;

/// Consumer callbacks.
pub mod callbacks;

/// Connection controller.
pub mod core;

/// Session task.
mod session;

/// Observable state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ConnectionBuilder;
pub use callbacks::{Callback, Callbacks, ErrorCallback, MessageCallback, TerminalCallback};
pub use core::Connection;
pub use state::{CloseReason, ConnectionSnapshot, ConnectionState, FailureInfo};
