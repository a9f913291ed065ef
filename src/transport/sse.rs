//! Server-Sent Events transport.
//!
//! Issues a `GET` with `Accept: text/event-stream` and parses the streaming
//! body into events. Each event's `data` becomes one frame.
//!
//! # Event Stream Format
//!
//! ```text
//! id: 42
//! event: message
//! data: {"type":"log",
//! data:  "message":"hi"}
//!
//! : comment lines are ignored
//! ```
//!
//! - `data` lines are joined with `\n`
//! - an empty line dispatches the event
//! - the last seen `id` is sent back as `Last-Event-ID` on reconnect
//! - `\n`, `\r\n` and `\r` all end a line
//! - a UTF-8 byte order mark at the very start of the stream is skipped

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use parking_lot::Mutex;
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

use super::{Transport, TransportHandle};

// ============================================================================
// Constants
// ============================================================================

/// Media type of an event stream.
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Header carrying the last seen event ID on reconnect.
const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// UTF-8 byte order mark.
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// SseEvent
// ============================================================================

/// One dispatched event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// `id` field, if the event carried one.
    pub id: Option<String>,
    /// `event` field, if the event carried one.
    pub event: Option<String>,
    /// Joined `data` lines.
    pub data: String,
    /// `retry` field in milliseconds, if present.
    pub retry: Option<u64>,
}

// ============================================================================
// EventStreamParser
// ============================================================================

/// Incremental event-stream parser.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence or
/// between `\r` and `\n`.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    /// Bytes not yet terminated by a line ending.
    buffer: Vec<u8>,
    /// Previous chunk ended in `\r`; a leading `\n` belongs to it.
    pending_cr: bool,
    /// Stream start has been checked for a byte order mark.
    bom_checked: bool,
    /// `data` lines of the event being built.
    data: Vec<String>,
    /// `event` field of the event being built.
    event: Option<String>,
    /// `id` field of the event being built.
    id: Option<String>,
    /// `retry` field of the event being built.
    retry: Option<u64>,
}

impl EventStreamParser {
    /// Creates an empty parser.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut chunk = chunk;
        if self.pending_cr {
            self.pending_cr = false;
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
        }
        self.buffer.extend_from_slice(chunk);

        if !self.bom_checked {
            // Wait until a BOM split across chunks can be told apart.
            if self.buffer.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&self.buffer) {
                return Vec::new();
            }
            self.bom_checked = true;
            if self.buffer.starts_with(UTF8_BOM) {
                self.buffer.drain(..UTF8_BOM.len());
            }
        }

        let mut events = Vec::new();
        let mut start = 0;
        let mut index = 0;

        while index < self.buffer.len() {
            let byte = self.buffer[index];
            if byte != b'\n' && byte != b'\r' {
                index += 1;
                continue;
            }

            let line = String::from_utf8_lossy(&self.buffer[start..index]).into_owned();

            let mut next = index + 1;
            if byte == b'\r' {
                match self.buffer.get(next) {
                    Some(b'\n') => next += 1,
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            }

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }

            start = next;
            index = next;
        }

        self.buffer.drain(..start);
        events
    }

    /// Applies one complete line.
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.retry = Some(retry);
                }
            }
            _ => trace!(field, "Ignoring unknown event-stream field"),
        }
        None
    }

    /// Finishes the event being built.
    ///
    /// An event without data is still returned when it carries an `id`, so
    /// the last event ID advances.
    fn dispatch(&mut self) -> Option<SseEvent> {
        let id = self.id.take();
        let event = self.event.take();
        let retry = self.retry.take();

        if self.data.is_empty() && id.is_none() {
            return None;
        }

        let data = self.data.join("\n");
        self.data.clear();

        Some(SseEvent {
            id,
            event,
            data,
            retry,
        })
    }
}

// ============================================================================
// EventStreamTransport
// ============================================================================

/// Transport over `http://` and `https://` event-stream endpoints.
///
/// The last event ID is shared across every handle this transport opens, so
/// a reconnect resumes where the previous stream stopped.
#[derive(Debug, Clone)]
pub struct EventStreamTransport {
    /// HTTP client.
    client: Client,
    /// Last event ID seen on any handle.
    last_event_id: Arc<Mutex<Option<String>>>,
}

impl EventStreamTransport {
    /// Creates a transport with a default HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(Client::builder().build()?))
    }

    /// Creates a transport around an existing client.
    ///
    /// The client must not set a total request timeout, or long-lived
    /// streams will be cut.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            last_event_id: Arc::new(Mutex::new(None)),
        }
    }

    /// Last event ID received, if any.
    #[must_use]
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.lock().clone()
    }
}

#[async_trait]
impl Transport for EventStreamTransport {
    fn name(&self) -> &'static str {
        "sse"
    }

    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn TransportHandle>> {
        let endpoint = config.endpoint();

        let mut request = self
            .client
            .get(endpoint.clone())
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache");

        for (name, value) in config.request_headers() {
            request = request.header(name, value);
        }

        if let Some(id) = self.last_event_id() {
            debug!(last_event_id = %id, "Resuming event stream");
            request = request.header(LAST_EVENT_ID_HEADER, id);
        }

        let connect_timeout = config.connect_timeout();
        let response = timeout(connect_timeout, request.send())
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::http_status(status.as_u16(), endpoint.as_str()));
        }

        debug!(endpoint = %endpoint, status = status.as_u16(), "Event stream opened");

        Ok(Box::new(EventStreamHandle {
            body: response.bytes_stream().boxed(),
            parser: EventStreamParser::new(),
            pending: VecDeque::new(),
            last_event_id: Arc::clone(&self.last_event_id),
        }))
    }
}

// ============================================================================
// EventStreamHandle
// ============================================================================

/// Live event stream.
struct EventStreamHandle {
    /// Response body.
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    /// Parser state.
    parser: EventStreamParser,
    /// Parsed events not yet returned.
    pending: VecDeque<SseEvent>,
    /// Shared last event ID.
    last_event_id: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl TransportHandle for EventStreamHandle {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            while let Some(event) = self.pending.pop_front() {
                if let Some(id) = event.id {
                    *self.last_event_id.lock() = Some(id);
                }
                if !event.data.is_empty() {
                    return Some(Ok(event.data));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    let events = self.parser.feed(&chunk);
                    self.pending.extend(events);
                }
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the body aborts the request
        self.body = futures_util::stream::empty().boxed();
        self.pending.clear();
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
