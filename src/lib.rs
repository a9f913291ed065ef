//! Resilient Stream - Reconnecting real-time stream client.
//!
//! This library keeps a WebSocket or Server-Sent Events stream alive for a
//! consumer, retrying lost connections with capped, jittered exponential
//! backoff and routing inbound JSON messages by their `type` field.
//!
//! # Architecture
//!
//! One parametrized controller replaces per-transport clients:
//!
//! - **Transport** (strategy): WebSocket, SSE, or in-memory for tests
//! - **Backoff policy**: `min(base * 2^(n-1) + jitter, max)`
//! - **Dispatcher**: decode, validate kind, route to one handler per kind
//! - **Consumer**: reactive snapshot + disconnect on scope exit
//!
//! Key design principles:
//!
//! - Each [`Connection`] owns at most one live handle and one reconnect timer
//! - No process-wide singletons; every consumer owns its connection
//! - Malformed or unknown frames never affect connection state
//! - Event-driven: consumers await changes instead of polling
//!
//! # Quick Start
//!
//! ```no_run
//! use resilient_stream::{Connection, Result, StreamConsumer, WorkflowEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::builder()
//!         .endpoint("wss://api.example.com/ws/workflows/42")
//!         .max_reconnect_attempts(5)
//!         .on_message(|message| {
//!             if let WorkflowEvent::NodeCompleted { node_id, .. } = WorkflowEvent::parse(message) {
//!                 println!("node {node_id} done");
//!             }
//!         })
//!         .build()?;
//!
//!     let mut consumer = StreamConsumer::mount(connection)?;
//!     let snapshot = consumer.wait_for(|s| s.state.is_terminal()).await?;
//!     println!("Stream ended: {:?}", snapshot.close_reason);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backoff`] | Reconnect delay policy and jitter sources |
//! | [`config`] | [`ConnectionConfig`] and [`ConnectionOptions`] |
//! | [`connection`] | [`Connection`] controller and its builder |
//! | [`consumer`] | [`StreamConsumer`] scoped adapter |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Message decoding and dispatch |
//! | [`transport`] | WebSocket, SSE and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Reconnect delay computation.
pub mod backoff;

/// Connection configuration and recognized options.
pub mod config;

/// Connection lifecycle controller.
///
/// Use [`Connection::builder()`] to create a configured connection.
pub mod connection;

/// Consumer adapter with scoped cleanup.
pub mod consumer;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Inbound message decoding and dispatch.
pub mod protocol;

/// Stream transports.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Backoff types
pub use backoff::{BackoffPolicy, FixedJitter, JitterSource, NoJitter, ThreadRngJitter};

// Configuration types
pub use config::{ConnectionConfig, ConnectionOptions, CredentialsMode, TransportKind};

// Connection types
pub use connection::{
    Callbacks, CloseReason, Connection, ConnectionBuilder, ConnectionSnapshot, ConnectionState,
    FailureInfo,
};

// Consumer types
pub use consumer::StreamConsumer;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ConnectionId, Generation};

// Protocol types
pub use protocol::{DispatchOutcome, Dispatcher, InboundMessage, WorkflowEvent};

// Transport types
pub use transport::{MemoryPeer, MemoryTransport, Transport, TransportHandle};
