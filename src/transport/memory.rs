//! Scripted in-process transport.
//!
//! Each call to `open` consumes the next scripted outcome: either a refusal
//! or an accepted handle whose server side is handed out as a
//! [`MemoryPeer`]. When the script is empty the transport falls back to its
//! default behavior.
//!
//! The transport records when each open happened and how many handles are
//! alive, which is what lifecycle tests assert on.
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::refusing();
//! transport.push_accept();
//!
//! // First open succeeds, every later one is refused.
//! let peer = transport.next_peer().await.unwrap();
//! peer.send(r#"{"type":"log"}"#);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

use super::{Transport, TransportHandle};

// ============================================================================
// Types
// ============================================================================

/// Outcome of one open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenOutcome {
    /// Hand out a live handle.
    Accept,
    /// Fail the open.
    Refuse,
}

/// Frame pushed by the server side.
#[derive(Debug)]
enum PeerFrame {
    /// Text frame.
    Text(String),
    /// Transport-level error.
    Error(String),
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// State shared by the transport and its handles.
struct MemoryInner {
    /// Scripted outcomes, consumed front to back.
    script: Mutex<VecDeque<OpenOutcome>>,
    /// Outcome when the script is empty.
    fallback: OpenOutcome,
    /// Time of every open call.
    opens: Mutex<Vec<Instant>>,
    /// Handles currently alive.
    live: Arc<AtomicUsize>,
    /// Server sides of accepted handles.
    peer_tx: mpsc::UnboundedSender<MemoryPeer>,
    /// Receiver for [`MemoryTransport::next_peer`].
    peer_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

/// In-process transport driven by a script.
#[derive(Clone)]
pub struct MemoryTransport {
    /// Shared state.
    inner: Arc<MemoryInner>,
}

impl MemoryTransport {
    /// Creates a transport that accepts every unscripted open.
    #[must_use]
    pub fn accepting() -> Self {
        Self::with_fallback(OpenOutcome::Accept)
    }

    /// Creates a transport that refuses every unscripted open.
    #[must_use]
    pub fn refusing() -> Self {
        Self::with_fallback(OpenOutcome::Refuse)
    }

    fn with_fallback(fallback: OpenOutcome) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MemoryInner {
                script: Mutex::new(VecDeque::new()),
                fallback,
                opens: Mutex::new(Vec::new()),
                live: Arc::new(AtomicUsize::new(0)),
                peer_tx,
                peer_rx: tokio::sync::Mutex::new(peer_rx),
            }),
        }
    }

    /// Scripts the next unscripted open to succeed.
    pub fn push_accept(&self) {
        self.inner.script.lock().push_back(OpenOutcome::Accept);
    }

    /// Scripts the next unscripted open to fail.
    pub fn push_refusal(&self) {
        self.inner.script.lock().push_back(OpenOutcome::Refuse);
    }

    /// Scripts `count` consecutive refusals.
    pub fn push_refusals(&self, count: usize) {
        let mut script = self.inner.script.lock();
        script.extend(std::iter::repeat_n(OpenOutcome::Refuse, count));
    }

    /// Number of open calls so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner.opens.lock().len()
    }

    /// Time of every open call, in order.
    #[must_use]
    pub fn open_times(&self) -> Vec<Instant> {
        self.inner.opens.lock().clone()
    }

    /// Number of handles currently alive.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Waits for the server side of the next accepted handle.
    pub async fn next_peer(&self) -> Option<MemoryPeer> {
        self.inner.peer_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn TransportHandle>> {
        self.inner.opens.lock().push(Instant::now());

        let outcome = self
            .inner
            .script
            .lock()
            .pop_front()
            .unwrap_or(self.inner.fallback);

        trace!(endpoint = %config.endpoint(), ?outcome, "Memory transport open");

        if outcome == OpenOutcome::Refuse {
            return Err(Error::connection("connection refused"));
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let client_closed = Arc::new(AtomicBool::new(false));
        self.inner.live.fetch_add(1, Ordering::SeqCst);

        let peer = MemoryPeer {
            frame_tx,
            client_closed: Arc::clone(&client_closed),
        };
        self.inner
            .peer_tx
            .send(peer)
            .map_err(|_| Error::connection("memory transport dropped"))?;

        Ok(Box::new(MemoryHandle {
            frame_rx,
            client_closed,
            live: Arc::clone(&self.inner.live),
        }))
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server side of one accepted memory handle.
///
/// Dropping the peer closes the stream from the server side.
#[derive(Debug)]
pub struct MemoryPeer {
    /// Frames toward the client.
    frame_tx: mpsc::UnboundedSender<PeerFrame>,
    /// Set when the client closed its handle.
    client_closed: Arc<AtomicBool>,
}

impl MemoryPeer {
    /// Pushes a text frame. Returns `false` if the handle is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.frame_tx.send(PeerFrame::Text(text.into())).is_ok()
    }

    /// Fails the stream with a transport error.
    pub fn fail(self, message: impl Into<String>) {
        let _ = self.frame_tx.send(PeerFrame::Error(message.into()));
    }

    /// Closes the stream cleanly from the server side.
    pub fn close(self) {
        drop(self);
    }

    /// Returns `true` if the client closed its handle with a normal closure.
    #[must_use]
    pub fn closed_by_client(&self) -> bool {
        self.client_closed.load(Ordering::SeqCst)
    }

    /// Returns `true` once the client handle has been dropped.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.frame_tx.is_closed()
    }
}

// ============================================================================
// MemoryHandle
// ============================================================================

/// Client side of one accepted memory handle.
struct MemoryHandle {
    /// Frames from the peer.
    frame_rx: mpsc::UnboundedReceiver<PeerFrame>,
    /// Shared with the peer.
    client_closed: Arc<AtomicBool>,
    /// Live-handle counter of the transport.
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportHandle for MemoryHandle {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        match self.frame_rx.recv().await? {
            PeerFrame::Text(text) => Some(Ok(text)),
            PeerFrame::Error(message) => Some(Err(Error::connection(message))),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.client_closed.store(true, Ordering::SeqCst);
        self.frame_rx.close();
        Ok(())
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
