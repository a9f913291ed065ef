//! Kind-based routing of decoded messages.
//!
//! The [`Dispatcher`] owns the set of known message kinds and at most one
//! handler per kind. A frame is handled in three steps:
//!
//! 1. Decode. Malformed frames are logged and dropped.
//! 2. Validate the kind. Unknown kinds are logged and dropped.
//! 3. Invoke the kind's handler, if one is registered.
//!
//! None of these steps can fail the connection. A panicking handler is
//! logged and the message still counts as delivered.
//!
//! A dispatcher with no known kinds at all is permissive and accepts every
//! well-formed message.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{error, trace, warn};

use crate::error::Error;

use super::message::InboundMessage;

// ============================================================================
// Types
// ============================================================================

/// Handler callback for one message kind.
pub type MessageHandler = Box<dyn Fn(&InboundMessage) + Send + Sync>;

// ============================================================================
// DispatchOutcome
// ============================================================================

/// Result of feeding one frame to the dispatcher.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Recognized and passed to its handler.
    Delivered(InboundMessage),
    /// Recognized, no handler registered for the kind.
    Accepted(InboundMessage),
    /// Well-formed but of an unknown kind. Dropped.
    Unknown {
        /// The unrecognized kind.
        kind: String,
    },
    /// Could not be decoded. Dropped.
    Malformed(Error),
}

impl DispatchOutcome {
    /// Returns the message if the frame was recognized.
    #[inline]
    #[must_use]
    pub fn message(&self) -> Option<&InboundMessage> {
        match self {
            Self::Delivered(message) | Self::Accepted(message) => Some(message),
            Self::Unknown { .. } | Self::Malformed(_) => None,
        }
    }

    /// Consumes the outcome, returning the message if recognized.
    #[inline]
    #[must_use]
    pub fn into_message(self) -> Option<InboundMessage> {
        match self {
            Self::Delivered(message) | Self::Accepted(message) => Some(message),
            Self::Unknown { .. } | Self::Malformed(_) => None,
        }
    }

    /// Returns `true` if the frame was recognized.
    #[inline]
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        self.message().is_some()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes decoded messages to per-kind handlers.
#[derive(Default)]
pub struct Dispatcher {
    /// Handler per kind.
    handlers: FxHashMap<String, MessageHandler>,
    /// Kinds accepted without a handler.
    accepted: FxHashSet<String>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handled: Vec<_> = self.handlers.keys().collect();
        handled.sort();
        f.debug_struct("Dispatcher")
            .field("handled", &handled)
            .field("accepted", &self.accepted)
            .finish()
    }
}

impl Dispatcher {
    /// Creates an empty, permissive dispatcher.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), Box::new(handler)).is_some() {
            warn!(kind = %kind, "Replaced existing message handler");
        }
    }

    /// Marks `kind` as known without a handler.
    pub fn accept(&mut self, kind: impl Into<String>) {
        self.accepted.insert(kind.into());
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_handler<F>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.register(kind, handler);
        self
    }

    /// Builder form of [`accept`](Self::accept) for several kinds.
    #[must_use]
    pub fn with_accepted<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for kind in kinds {
            self.accept(kind);
        }
        self
    }

    /// Returns `true` if no kinds are known, so every kind is accepted.
    #[inline]
    #[must_use]
    pub fn is_permissive(&self) -> bool {
        self.handlers.is_empty() && self.accepted.is_empty()
    }

    /// Returns `true` if messages of `kind` are recognized.
    #[must_use]
    pub fn is_known(&self, kind: &str) -> bool {
        self.is_permissive() || self.handlers.contains_key(kind) || self.accepted.contains(kind)
    }

    /// Decodes, validates and routes one text frame.
    pub fn dispatch(&self, text: &str) -> DispatchOutcome {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame_len = text.len(), "Dropping malformed frame");
                return DispatchOutcome::Malformed(e);
            }
        };

        self.route(message)
    }

    /// Validates and routes an already decoded message.
    pub fn route(&self, message: InboundMessage) -> DispatchOutcome {
        if !self.is_known(&message.kind) {
            warn!(kind = %message.kind, "Dropping message of unknown kind");
            return DispatchOutcome::Unknown { kind: message.kind };
        }

        match self.handlers.get(&message.kind) {
            Some(handler) => {
                trace!(kind = %message.kind, "Dispatching message");
                if catch_unwind(AssertUnwindSafe(|| handler(&message))).is_err() {
                    error!(kind = %message.kind, "Message handler panicked");
                }
                DispatchOutcome::Delivered(message)
            }
            None => DispatchOutcome::Accepted(message),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
