//! Stream transports.
//!
//! A [`Transport`] opens [`TransportHandle`]s. The connection controller
//! owns at most one handle at a time and drives it from its session task.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   open()    ┌──────────────────────┐
//! │  Connection          │────────────►│  Transport           │
//! │  (session task)      │             │  ws / sse / memory   │
//! │                      │◄────────────│                      │
//! │  next_frame / close  │   handle    └──────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | Bidirectional socket via `tokio-tungstenite` |
//! | `sse` | Server-Sent Events via a streaming `reqwest` body |
//! | `memory` | Scripted in-process transport for tests |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ConnectionConfig, TransportKind};
use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Scripted in-process transport.
pub mod memory;

/// Server-Sent Events transport.
pub mod sse;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryTransport};
pub use sse::{EventStreamParser, EventStreamTransport, SseEvent};
pub use websocket::WebSocketTransport;

// ============================================================================
// Traits
// ============================================================================

/// Opens transport handles for a configuration.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short transport name for logs.
    fn name(&self) -> &'static str;

    /// Opens a new handle to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Any connection-level error. The controller treats every error here
    /// as a failed attempt.
    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn TransportHandle>>;
}

/// One live connection to the server.
///
/// Dropping a handle releases the underlying connection.
#[async_trait]
pub trait TransportHandle: Send {
    /// Waits for the next text frame.
    ///
    /// Returns `None` once the server closed the stream. Must be
    /// cancellation safe: a dropped call must not lose a buffered frame.
    async fn next_frame(&mut self) -> Option<Result<String>>;

    /// Closes the handle with a normal closure.
    async fn close(&mut self) -> Result<()>;
}

// ============================================================================
// Functions
// ============================================================================

/// Picks the transport implied by the endpoint scheme.
///
/// # Errors
///
/// Returns [`Error::Http`](crate::Error::Http) if the HTTP client for the
/// event-stream transport cannot be created.
pub fn for_config(config: &ConnectionConfig) -> Result<Arc<dyn Transport>> {
    Ok(match config.transport_kind() {
        TransportKind::WebSocket => Arc::new(WebSocketTransport::new()),
        TransportKind::EventStream => Arc::new(EventStreamTransport::new()?),
    })
}

// ============================================================================
// Tests
// ============================================================================
