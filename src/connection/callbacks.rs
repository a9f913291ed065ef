//! Consumer callback surface.
//!
//! All callbacks are optional and run on the session task, outside any
//! internal lock. Each fires at most once per event. A panicking callback is
//! logged and contained so the session keeps running.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::error::Error;
use crate::protocol::InboundMessage;

use super::state::CloseReason;

// ============================================================================
// Types
// ============================================================================

/// Callback without arguments.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Callback receiving a decoded message.
pub type MessageCallback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Callback receiving a transport error.
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Callback receiving the terminal close reason.
pub type TerminalCallback = Arc<dyn Fn(CloseReason) + Send + Sync>;

// ============================================================================
// Callbacks
// ============================================================================

/// Optional lifecycle callbacks.
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Handle opened.
    on_open: Option<Callback>,
    /// Recognized message received.
    on_message: Option<MessageCallback>,
    /// Transport error.
    on_error: Option<ErrorCallback>,
    /// Handle closed, for any reason.
    on_close: Option<Callback>,
    /// Connection gave up.
    on_terminal: Option<TerminalCallback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_terminal", &self.on_terminal.is_some())
            .finish()
    }
}

impl Callbacks {
    /// Creates an empty callback set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the open callback.
    #[must_use]
    pub fn on_open(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Arc::new(callback));
        self
    }

    /// Sets the message callback.
    #[must_use]
    pub fn on_message(
        mut self,
        callback: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(callback));
        self
    }

    /// Sets the error callback.
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Sets the close callback.
    #[must_use]
    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(callback));
        self
    }

    /// Sets the terminal callback, fired when the connection gives up.
    #[must_use]
    pub fn on_terminal(mut self, callback: impl Fn(CloseReason) + Send + Sync + 'static) -> Self {
        self.on_terminal = Some(Arc::new(callback));
        self
    }

    pub(crate) fn open(&self) {
        if let Some(callback) = &self.on_open {
            contain("on_open", || callback());
        }
    }

    pub(crate) fn message(&self, message: &InboundMessage) {
        if let Some(callback) = &self.on_message {
            contain("on_message", || callback(message));
        }
    }

    pub(crate) fn error(&self, error: &Error) {
        if let Some(callback) = &self.on_error {
            contain("on_error", || callback(error));
        }
    }

    pub(crate) fn close(&self) {
        if let Some(callback) = &self.on_close {
            contain("on_close", || callback());
        }
    }

    pub(crate) fn terminal(&self, reason: CloseReason) {
        if let Some(callback) = &self.on_terminal {
            contain("on_terminal", || callback(reason));
        }
    }
}

/// Runs a consumer callback, logging instead of unwinding through the session.
fn contain(callback: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback, "Consumer callback panicked");
    }
}
