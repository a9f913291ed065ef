//! Consumer adapter over a [`Connection`].
//!
//! A [`StreamConsumer`] is what UI code holds: it mounts a connection,
//! exposes the current state for rendering, wakes up on every change and
//! disconnects when it goes out of scope, including during unwinding.
//!
//! # Example
//!
//! ```no_run
//! use resilient_stream::{Connection, StreamConsumer};
//!
//! # async fn example() -> resilient_stream::Result<()> {
//! let connection = Connection::builder()
//!     .endpoint("wss://api.example.com/ws/workflows/42")
//!     .build()?;
//!
//! let mut consumer = StreamConsumer::mount(connection)?;
//! while let Ok(snapshot) = consumer.changed().await {
//!     if snapshot.needs_manual_retry() {
//!         consumer.retry()?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::connection::{Connection, ConnectionSnapshot, ConnectionState, FailureInfo};
use crate::error::{Error, Result};
use crate::protocol::InboundMessage;

// ============================================================================
// StreamConsumer
// ============================================================================

/// Scoped, observable handle on one connection.
///
/// Dropping the consumer disconnects the connection.
#[derive(Debug)]
pub struct StreamConsumer {
    /// Owned connection.
    connection: Connection,
    /// Change notifications.
    updates: watch::Receiver<ConnectionSnapshot>,
}

// ============================================================================
// StreamConsumer - Constructors
// ============================================================================

impl StreamConsumer {
    /// Takes ownership of `connection` and connects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] outside a tokio runtime.
    pub fn mount(connection: Connection) -> Result<Self> {
        let consumer = Self::idle(connection);
        consumer.connection.connect()?;
        Ok(consumer)
    }

    /// Takes ownership of `connection` without connecting it.
    #[must_use]
    pub fn idle(connection: Connection) -> Self {
        let updates = connection.subscribe();
        Self {
            connection,
            updates,
        }
    }
}

// ============================================================================
// StreamConsumer - State
// ============================================================================

impl StreamConsumer {
    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.updates.borrow().state
    }

    /// Returns `true` while the connection is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.updates.borrow().is_connected()
    }

    /// Most recent recognized message.
    #[must_use]
    pub fn last_message(&self) -> Option<Arc<InboundMessage>> {
        self.updates.borrow().last_message.clone()
    }

    /// Most recent transport failure.
    #[must_use]
    pub fn last_error(&self) -> Option<FailureInfo> {
        self.updates.borrow().last_error.clone()
    }

    /// Reconnect attempts since the last successful open.
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.updates.borrow().attempts
    }

    /// Full current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.updates.borrow().clone()
    }

    /// Waits until anything observable changes, then returns the new snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection was dropped.
    pub async fn changed(&mut self) -> Result<ConnectionSnapshot> {
        self.updates
            .changed()
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(self.updates.borrow_and_update().clone())
    }

    /// Waits until `predicate` holds for the current snapshot.
    ///
    /// Returns immediately if it already holds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection was dropped.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Result<ConnectionSnapshot>
    where
        F: FnMut(&ConnectionSnapshot) -> bool,
    {
        let snapshot = self
            .updates
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(snapshot.clone())
    }
}

// ============================================================================
// StreamConsumer - Actions
// ============================================================================

impl StreamConsumer {
    /// Manual retry: clears attempts and errors, then connects again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] outside a tokio runtime.
    pub fn retry(&self) -> Result<()> {
        debug!(connection_id = %self.connection.id(), "Manual retry");
        self.connection.reset();
        self.connection.connect()
    }

    /// Disconnects without dropping the consumer.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// The underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

// ============================================================================
// Tests
// ============================================================================
