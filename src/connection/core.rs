//! Connection lifecycle controller.
//!
//! The [`Connection`] owns at most one background session task. The task
//! owns the live transport handle and the reconnect timer, so "one handle,
//! one timer" follows from "one current session".
//!
//! # Example
//!
//! ```no_run
//! use resilient_stream::Connection;
//!
//! # async fn example() -> resilient_stream::Result<()> {
//! let connection = Connection::builder()
//!     .endpoint("wss://api.example.com/ws/workflows/42")
//!     .max_reconnect_attempts(3)
//!     .on_message(|message| println!("{}", message.kind))
//!     .build()?;
//!
//! connection.connect()?;
//! // ...
//! connection.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ConnectionId, Generation};
use crate::protocol::{Dispatcher, InboundMessage};
use crate::transport::Transport;

use super::builder::ConnectionBuilder;
use super::callbacks::Callbacks;
use super::session;
use super::state::{CloseReason, ConnectionSnapshot, ConnectionState, FailureInfo};

// ============================================================================
// Types
// ============================================================================

/// Session bookkeeping guarded by one lock.
#[derive(Default)]
pub(crate) struct Control {
    /// Current generation; sessions with another one are stale.
    generation: Generation,
    /// Wakes the current session for shutdown.
    shutdown: Option<oneshot::Sender<()>>,
    /// Most recent session task.
    task: Option<JoinHandle<()>>,
}

impl Control {
    /// Signals the current session and moves to a new generation.
    ///
    /// The session task is kept so the next session can wait for it.
    fn retire(&mut self) -> Generation {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.generation = self.generation.next();
        self.generation
    }
}

/// Decision after a failed attempt or a lost handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Sleep, then try again.
    Schedule {
        /// Attempt number being scheduled.
        attempt: u32,
        /// Delay before it.
        delay: Duration,
    },
    /// Stop for good.
    GiveUp(CloseReason),
    /// Session is no longer current.
    Stale,
}

/// State shared by the controller and its session tasks.
pub(crate) struct Shared {
    /// Connection identity.
    pub(crate) id: ConnectionId,
    /// Immutable configuration.
    pub(crate) config: Arc<ConnectionConfig>,
    /// Transport strategy.
    pub(crate) transport: Arc<dyn Transport>,
    /// Reconnect delay policy.
    pub(crate) backoff: BackoffPolicy,
    /// Message routing.
    pub(crate) dispatcher: Dispatcher,
    /// Consumer callbacks.
    pub(crate) callbacks: Callbacks,
    /// Session bookkeeping.
    control: Mutex<Control>,
    /// Published state.
    snapshot: watch::Sender<ConnectionSnapshot>,
}

// ============================================================================
// Shared - Session Transitions
// ============================================================================

impl Shared {
    /// Returns `true` if `generation` is the current one.
    pub(crate) fn is_current(&self, generation: Generation) -> bool {
        self.control.lock().generation == generation
    }

    /// Marks the start of an open attempt.
    ///
    /// Returns `false` if the session is stale and must exit.
    pub(crate) fn begin_attempt(&self, generation: Generation) -> bool {
        let control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        self.snapshot.send_if_modified(|snapshot| {
            let changed =
                snapshot.state != ConnectionState::Connecting || snapshot.reconnect_pending;
            snapshot.state = ConnectionState::Connecting;
            snapshot.reconnect_pending = false;
            changed
        });
        true
    }

    /// Marks the handle as open and resets the attempt counter.
    ///
    /// Returns `false` if the session is stale and must exit.
    pub(crate) fn mark_open(&self, generation: Generation) -> bool {
        let control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        self.snapshot.send_modify(|snapshot| {
            snapshot.state = ConnectionState::Open;
            snapshot.attempts = 0;
            snapshot.reconnect_pending = false;
            snapshot.close_reason = None;
        });
        true
    }

    /// Records a recognized message.
    pub(crate) fn record_message(&self, generation: Generation, message: Arc<InboundMessage>) -> bool {
        let control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        self.snapshot.send_modify(|snapshot| {
            snapshot.last_message = Some(message);
        });
        true
    }

    /// Handles a failed attempt or a lost handle.
    pub(crate) fn after_failure(&self, generation: Generation, error: &Error) -> RetryDecision {
        let control = self.control.lock();
        if control.generation != generation {
            return RetryDecision::Stale;
        }

        let mut decision = RetryDecision::Stale;
        self.snapshot.send_modify(|snapshot| {
            snapshot.state = ConnectionState::Failed;
            snapshot.last_error = Some(FailureInfo::from_error(error, snapshot.attempts));

            decision = if !self.config.reconnect() {
                RetryDecision::GiveUp(CloseReason::ReconnectDisabled)
            } else if snapshot.attempts >= self.config.max_attempts() {
                RetryDecision::GiveUp(CloseReason::Exhausted)
            } else {
                snapshot.attempts += 1;
                snapshot.reconnect_pending = true;
                RetryDecision::Schedule {
                    attempt: snapshot.attempts,
                    delay: self.backoff.delay(snapshot.attempts),
                }
            };

            if let RetryDecision::GiveUp(reason) = decision {
                snapshot.state = ConnectionState::Closed;
                snapshot.close_reason = Some(reason);
            }
        });
        drop(control);

        match decision {
            RetryDecision::Schedule { attempt, delay } => warn!(
                connection_id = %self.id,
                attempt,
                max_attempts = self.config.max_attempts(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Connection lost, scheduling reconnect"
            ),
            RetryDecision::GiveUp(CloseReason::Exhausted) => error!(
                connection_id = %self.id,
                max_attempts = self.config.max_attempts(),
                error = %error,
                "Reconnect attempts exhausted"
            ),
            RetryDecision::GiveUp(reason) => info!(
                connection_id = %self.id,
                ?reason,
                error = %error,
                "Connection closed"
            ),
            RetryDecision::Stale => {}
        }

        decision
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Reconnecting stream connection.
///
/// Each consumer owns its own connection; nothing is shared between
/// instances. Dropping the connection disconnects it.
pub struct Connection {
    /// Shared with session tasks.
    shared: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.config.endpoint().as_str())
            .field("transport", &self.shared.transport.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Constructors
// ============================================================================

impl Connection {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Assembles a connection from its parts.
    pub(crate) fn from_parts(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        backoff: BackoffPolicy,
        dispatcher: Dispatcher,
        callbacks: Callbacks,
    ) -> Self {
        let (snapshot, _) = watch::channel(ConnectionSnapshot::default());
        let id = ConnectionId::generate();

        debug!(
            connection_id = %id,
            endpoint = %config.endpoint(),
            transport = transport.name(),
            "Connection created"
        );

        Self {
            shared: Arc::new(Shared {
                id,
                config: Arc::new(config),
                transport,
                backoff,
                dispatcher,
                callbacks,
                control: Mutex::new(Control::default()),
                snapshot,
            }),
        }
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Starts connecting.
    ///
    /// No-op while `Connecting` or `Open`. Otherwise any prior session and
    /// its pending reconnect timer are torn down first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] outside a tokio runtime.
    pub fn connect(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        let mut control = self.shared.control.lock();
        let state = self.shared.snapshot.borrow().state;
        if state.is_active() {
            debug!(connection_id = %self.shared.id, %state, "connect() ignored, already active");
            return Ok(());
        }

        let generation = control.retire();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        control.shutdown = Some(shutdown_tx);
        let previous = control.task.take();

        self.shared.snapshot.send_modify(|snapshot| {
            snapshot.state = ConnectionState::Connecting;
            snapshot.reconnect_pending = false;
            snapshot.close_reason = None;
        });

        control.task = Some(runtime.spawn(session::run(
            Arc::clone(&self.shared),
            generation,
            shutdown_rx,
            previous,
        )));

        info!(
            connection_id = %self.shared.id,
            endpoint = %self.shared.config.endpoint(),
            %generation,
            "Connecting"
        );
        Ok(())
    }

    /// Closes the live handle, cancels any pending reconnect and moves to
    /// `Closed`. Idempotent.
    pub fn disconnect(&self) {
        let mut control = self.shared.control.lock();
        control.retire();

        let changed = self.shared.snapshot.send_if_modified(|snapshot| {
            if snapshot.state == ConnectionState::Closed && !snapshot.reconnect_pending {
                return false;
            }
            snapshot.state = ConnectionState::Closed;
            snapshot.reconnect_pending = false;
            snapshot.close_reason = Some(CloseReason::Disconnected);
            true
        });

        if changed {
            info!(connection_id = %self.shared.id, "Disconnected");
        }
    }

    /// Disconnects and clears attempts, last message and last error.
    ///
    /// The connection returns to `Idle`.
    pub fn reset(&self) {
        let mut control = self.shared.control.lock();
        control.retire();
        self.shared
            .snapshot
            .send_replace(ConnectionSnapshot::default());
        debug!(connection_id = %self.shared.id, "Connection reset");
    }

    /// Disconnects and waits until the session task has released the handle.
    pub async fn shutdown(&self) {
        let task = {
            let mut control = self.shared.control.lock();
            control.task.take()
        };
        self.disconnect();

        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(connection_id = %self.shared.id, error = %e, "Session task failed");
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Connection identity.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Immutable configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.snapshot.borrow().state
    }

    /// Reconnect attempts since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.shared.snapshot.borrow().attempts
    }

    /// Returns `true` while a reconnect timer is armed.
    #[must_use]
    pub fn is_reconnect_pending(&self) -> bool {
        self.shared.snapshot.borrow().reconnect_pending
    }

    /// Subscribes to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.shared.snapshot.subscribe()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
