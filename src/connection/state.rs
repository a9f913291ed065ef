//! Observable connection state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::protocol::InboundMessage;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
///
/// ```text
/// Idle --connect()--> Connecting --(open)--> Open
/// Open --(error/close, reconnect allowed)--> Failed --(timer)--> Connecting
/// Connecting --(error/close, attempts exhausted)--> Closed
/// Open --disconnect()--> Closed
/// Closed --connect()--> Connecting
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected, or reset.
    #[default]
    Idle,
    /// Opening a transport handle.
    Connecting,
    /// Handle open, frames flowing.
    Open,
    /// Terminal: disconnected or gave up.
    Closed,
    /// Handle lost, reconnect pending.
    Failed,
}

impl ConnectionState {
    /// Returns `true` for `Connecting` and `Open`.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Returns `true` for `Closed`.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// CloseReason
// ============================================================================

/// Why a connection reached `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The consumer called `disconnect()`. Not an error.
    Disconnected,
    /// Reconnect attempts ran out.
    Exhausted,
    /// The handle was lost and reconnection is disabled.
    ReconnectDisabled,
}

impl CloseReason {
    /// Returns `true` if the UI should surface a failure with a retry action.
    #[inline]
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

// ============================================================================
// FailureInfo
// ============================================================================

/// Cloneable record of the most recent transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureInfo {
    /// Rendered error.
    pub message: String,
    /// Whether a reconnect could fix it.
    pub recoverable: bool,
    /// Attempt counter at the time of the failure.
    pub attempt: u32,
}

impl FailureInfo {
    /// Captures an error.
    #[must_use]
    pub fn from_error(error: &Error, attempt: u32) -> Self {
        Self {
            message: error.to_string(),
            recoverable: error.is_recoverable(),
            attempt,
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (attempt {})", self.message, self.attempt)
    }
}

// ============================================================================
// ConnectionSnapshot
// ============================================================================

/// Everything a consumer renders from, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionSnapshot {
    /// Current state.
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub attempts: u32,
    /// Most recent recognized message.
    pub last_message: Option<Arc<InboundMessage>>,
    /// Most recent transport failure.
    pub last_error: Option<FailureInfo>,
    /// Set once the connection reaches `Closed`.
    pub close_reason: Option<CloseReason>,
    /// A reconnect timer is armed.
    pub reconnect_pending: bool,
}

impl ConnectionSnapshot {
    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Returns `true` while recovering from a transient failure.
    ///
    /// This is what drives a "reconnecting" badge.
    #[must_use]
    pub fn is_reconnecting(&self) -> bool {
        self.reconnect_pending || (self.state == ConnectionState::Connecting && self.attempts > 0)
    }

    /// Returns `true` if the connection gave up and needs a manual retry.
    #[must_use]
    pub fn needs_manual_retry(&self) -> bool {
        self.state.is_terminal() && self.close_reason.is_some_and(CloseReason::is_failure)
    }
}

// ============================================================================
// Tests
// ============================================================================
