//! Background session task.
//!
//! One session runs per `connect()`. It loops through
//! open → drive frames → decide → sleep until it gives up, goes stale, or
//! receives the shutdown signal. The transport handle and the reconnect
//! sleep both live on this task only.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::Error;
use crate::identifiers::Generation;
use crate::transport::TransportHandle;

use super::core::{RetryDecision, Shared};

// ============================================================================
// Types
// ============================================================================

/// How a driven handle ended.
enum HandleEnd {
    /// Shutdown requested or session went stale.
    Stopped,
    /// Handle failed or was closed by the remote side.
    Lost(Error),
}

// ============================================================================
// Session Loop
// ============================================================================

/// Runs one session until shutdown, staleness or a terminal decision.
pub(crate) async fn run(
    shared: Arc<Shared>,
    generation: Generation,
    mut shutdown: oneshot::Receiver<()>,
    previous: Option<JoinHandle<()>>,
) {
    // The previous session was already signalled; let it release its handle.
    if let Some(previous) = previous
        && let Err(e) = previous.await
    {
        warn!(connection_id = %shared.id, error = %e, "Previous session task failed");
    }

    loop {
        if !shared.begin_attempt(generation) {
            trace!(connection_id = %shared.id, %generation, "Stale session exiting");
            return;
        }

        let connect_timeout = shared.config.connect_timeout();
        let opened = tokio::select! {
            biased;
            _ = &mut shutdown => return,
            result = tokio::time::timeout(connect_timeout, shared.transport.open(&shared.config)) => {
                result.unwrap_or_else(|_| {
                    Err(Error::connection_timeout(connect_timeout.as_millis() as u64))
                })
            }
        };

        let error = match opened {
            Ok(handle) => match drive(&shared, generation, handle, &mut shutdown).await {
                HandleEnd::Stopped => return,
                HandleEnd::Lost(error) => error,
            },
            Err(error) => {
                debug!(
                    connection_id = %shared.id,
                    transport = shared.transport.name(),
                    error = %error,
                    "Open failed"
                );
                shared.callbacks.error(&error);
                error
            }
        };

        match shared.after_failure(generation, &error) {
            RetryDecision::Schedule { delay, .. } => {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::GiveUp(reason) => {
                shared.callbacks.terminal(reason);
                return;
            }
            RetryDecision::Stale => return,
        }
    }
}

// ============================================================================
// Frame Loop
// ============================================================================

/// Drives an open handle until it ends.
///
/// The handle is released before `on_close` fires.
async fn drive(
    shared: &Shared,
    generation: Generation,
    mut handle: Box<dyn TransportHandle>,
    shutdown: &mut oneshot::Receiver<()>,
) -> HandleEnd {
    if !shared.mark_open(generation) {
        close_handle(shared, &mut handle).await;
        return HandleEnd::Stopped;
    }

    info!(
        connection_id = %shared.id,
        transport = shared.transport.name(),
        "Connection open"
    );
    shared.callbacks.open();

    let end = loop {
        let frame = tokio::select! {
            biased;
            _ = &mut *shutdown => None,
            frame = handle.next_frame() => Some(frame),
        };

        match frame {
            None => {
                close_handle(shared, &mut handle).await;
                break HandleEnd::Stopped;
            }
            Some(Some(Ok(text))) => {
                if !handle_frame(shared, generation, &text) {
                    close_handle(shared, &mut handle).await;
                    break HandleEnd::Stopped;
                }
            }
            Some(Some(Err(error))) => {
                shared.callbacks.error(&error);
                break HandleEnd::Lost(error);
            }
            Some(None) => {
                debug!(connection_id = %shared.id, "Stream closed by remote");
                break HandleEnd::Lost(Error::ConnectionClosed);
            }
        }
    };

    drop(handle);
    shared.callbacks.close();
    end
}

/// Dispatches one text frame. Returns `false` if the session went stale.
fn handle_frame(shared: &Shared, generation: Generation, text: &str) -> bool {
    if !shared.is_current(generation) {
        return false;
    }

    // Malformed and unknown frames were logged by the dispatcher.
    let Some(message) = shared.dispatcher.dispatch(text).into_message() else {
        return true;
    };

    let message = Arc::new(message);
    if !shared.record_message(generation, Arc::clone(&message)) {
        return false;
    }
    shared.callbacks.message(&message);
    true
}

/// Closes a handle with a normal closure, logging failures.
async fn close_handle(shared: &Shared, handle: &mut Box<dyn TransportHandle>) {
    if let Err(e) = handle.close().await {
        debug!(connection_id = %shared.id, error = %e, "Close handshake failed");
    }
}
