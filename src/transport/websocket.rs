//! WebSocket transport.
//!
//! Opens a client socket with `tokio-tungstenite`. Text frames are passed up
//! as-is; binary, ping and pong frames are skipped. Closing sends a
//! normal-closure (1000) close frame.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};

use super::{Transport, TransportHandle};

// ============================================================================
// Constants
// ============================================================================

/// Reason text sent with the client close frame.
const CLOSE_REASON: &str = "client disconnect";

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Creates a WebSocket transport.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn open(&self, config: &ConnectionConfig) -> Result<Box<dyn TransportHandle>> {
        let mut request = config.endpoint().as_str().into_client_request()?;

        for (name, value) in config.request_headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::config(format!("invalid value for header '{name}': {e}")))?;
            request.headers_mut().append(name, value);
        }

        let connect_timeout = config.connect_timeout();
        let (stream, response) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        debug!(
            endpoint = %config.endpoint(),
            status = response.status().as_u16(),
            "WebSocket handshake completed"
        );

        Ok(Box::new(WebSocketHandle {
            stream,
            closed: false,
        }))
    }
}

// ============================================================================
// WebSocketHandle
// ============================================================================

/// Live WebSocket connection.
struct WebSocketHandle {
    /// Underlying socket.
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Close frame already sent.
    closed: bool,
}

#[async_trait]
impl TransportHandle for WebSocketHandle {
    async fn next_frame(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }

                Some(Ok(other)) => {
                    trace!(len = other.len(), "Skipping non-text WebSocket frame");
                }

                Some(Err(WsError::ConnectionClosed)) | None => return None,

                Some(Err(e)) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: String::from(CLOSE_REASON).into(),
        };

        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::SinkExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    async fn echo_server() -> (String, tokio::task::JoinHandle<Option<CloseCode>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.expect("accept");
            let mut ws = accept_async(tcp).await.expect("handshake");
            ws.send(Message::Text(r#"{"type":"heartbeat"}"#.to_string().into()))
                .await
                .expect("send");
            ws.send(Message::Binary(vec![1, 2, 3].into()))
                .await
                .expect("send");
            ws.send(Message::Text(r#"{"type":"log"}"#.to_string().into()))
                .await
                .expect("send");

            while let Some(Ok(message)) = ws.next().await {
                if let Message::Close(frame) = message {
                    return frame.map(|f| f.code);
                }
            }
            None
        });

        (format!("ws://127.0.0.1:{port}/ws"), server)
    }

    #[tokio::test]
    async fn test_receives_text_frames_and_closes_normally() {
        let (url, server) = echo_server().await;
        let config = ConnectionConfig::new(&url).expect("config");

        let mut handle = WebSocketTransport::new().open(&config).await.expect("open");

        let first = handle.next_frame().await.expect("frame").expect("ok");
        assert_eq!(first, r#"{"type":"heartbeat"}"#);

        let second = handle.next_frame().await.expect("frame").expect("ok");
        assert_eq!(second, r#"{"type":"log"}"#);

        handle.close().await.expect("close");
        handle.close().await.expect("second close is a no-op");

        assert_eq!(server.await.expect("server"), Some(CloseCode::Normal));
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let config = ConnectionConfig::new(&format!("ws://127.0.0.1:{port}/ws")).expect("config");
        let result = WebSocketTransport::new().open(&config).await;

        let err = result.err().expect("open must fail");
        assert!(err.is_connection_error());
    }
}
