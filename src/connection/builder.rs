//! Builder pattern for connection configuration.
//!
//! Provides a fluent API for configuring and creating [`Connection`]
//! instances.
//!
//! # Example
//!
//! ```no_run
//! use resilient_stream::{Connection, ConnectionOptions};
//!
//! # fn example() -> resilient_stream::Result<()> {
//! let options = ConnectionOptions::from_json(r#"{"maxReconnectAttempts": 3}"#)?;
//!
//! let connection = Connection::builder()
//!     .endpoint("https://api.example.com/executions/42/events")
//!     .options(options)
//!     .with_credentials(true)
//!     .credential_header("Authorization", "Bearer token")
//!     .on_kind("node_completed", |message| println!("{:?}", message.payload()))
//!     .accept_kinds(["heartbeat", "log"])
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::backoff::JitterSource;
use crate::config::{ConnectionConfig, ConnectionOptions};
use crate::error::{Error, Result};
use crate::protocol::{Dispatcher, InboundMessage};
use crate::transport::{self, Transport};

use super::callbacks::Callbacks;
use super::core::Connection;
use super::state::CloseReason;

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Builder for configuring a [`Connection`].
///
/// Use [`Connection::builder()`] to create a new builder.
#[derive(Default)]
pub struct ConnectionBuilder {
    /// Stream endpoint.
    endpoint: Option<String>,
    /// Recognized options.
    options: ConnectionOptions,
    /// Fully built configuration, overriding endpoint and options.
    config: Option<ConnectionConfig>,
    /// Connect timeout override.
    connect_timeout: Option<Duration>,
    /// Extra request headers.
    headers: Vec<(String, String)>,
    /// Credential headers.
    credential_headers: Vec<(String, String)>,
    /// Transport override.
    transport: Option<Arc<dyn Transport>>,
    /// Jitter source override.
    jitter: Option<Arc<dyn JitterSource>>,
    /// Message routing.
    dispatcher: Dispatcher,
    /// Lifecycle callbacks.
    callbacks: Callbacks,
}

// ============================================================================
// ConnectionBuilder - Configuration
// ============================================================================

impl ConnectionBuilder {
    /// Creates a builder with default options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stream endpoint.
    ///
    /// The scheme picks the transport: `ws`/`wss` for WebSocket,
    /// `http`/`https` for Server-Sent Events.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Uses a complete configuration instead of endpoint and options.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces all recognized options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, reconnect: bool) -> Self {
        self.options.reconnect = reconnect;
        self
    }

    /// Sets the base reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.options.reconnect_interval = interval.as_millis() as u64;
        self
    }

    /// Sets the ceiling for a single reconnect delay.
    #[inline]
    #[must_use]
    pub fn max_reconnect_delay(mut self, max: Duration) -> Self {
        self.options.max_reconnect_delay = max.as_millis() as u64;
        self
    }

    /// Sets the maximum number of reconnect attempts.
    #[inline]
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.options.max_reconnect_attempts = attempts;
        self
    }

    /// Sends credential headers with the stream request.
    #[inline]
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.options.with_credentials = with_credentials;
        self
    }

    /// Adds a header sent on every stream request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a header sent only when credentials are enabled.
    #[must_use]
    pub fn credential_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.credential_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the timeout for opening a transport handle.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Overrides the transport picked from the endpoint scheme.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Overrides the jitter source of the backoff policy.
    #[must_use]
    pub fn jitter(mut self, jitter: impl JitterSource) -> Self {
        self.jitter = Some(Arc::new(jitter));
        self
    }
}

// ============================================================================
// ConnectionBuilder - Messages and Callbacks
// ============================================================================

impl ConnectionBuilder {
    /// Registers the handler for one message kind.
    ///
    /// Registering any kind makes the dispatcher strict: frames of kinds
    /// that were neither registered nor accepted are dropped.
    #[must_use]
    pub fn on_kind<F>(mut self, kind: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.dispatcher.register(kind, handler);
        self
    }

    /// Marks one kind as known without a handler.
    #[must_use]
    pub fn accept_kind(mut self, kind: impl Into<String>) -> Self {
        self.dispatcher.accept(kind);
        self
    }

    /// Marks several kinds as known without a handler.
    #[must_use]
    pub fn accept_kinds<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dispatcher = self.dispatcher.with_accepted(kinds);
        self
    }

    /// Sets the open callback.
    #[must_use]
    pub fn on_open(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_open(callback);
        self
    }

    /// Sets the callback for every recognized message.
    #[must_use]
    pub fn on_message(mut self, callback: impl Fn(&InboundMessage) + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_message(callback);
        self
    }

    /// Sets the transport error callback.
    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_error(callback);
        self
    }

    /// Sets the close callback.
    #[must_use]
    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_close(callback);
        self
    }

    /// Sets the callback fired when the connection gives up.
    #[must_use]
    pub fn on_terminal(mut self, callback: impl Fn(CloseReason) + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_terminal(callback);
        self
    }

    /// Replaces all callbacks at once.
    #[must_use]
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

// ============================================================================
// ConnectionBuilder - Build
// ============================================================================

impl ConnectionBuilder {
    /// Builds the connection with validation. Does not connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set, the delays are inconsistent
    ///   or a header is not valid HTTP
    /// - [`Error::Url`] / [`Error::InvalidEndpoint`] for a bad endpoint
    /// - [`Error::Http`] if the event-stream client cannot be created
    pub fn build(self) -> Result<Connection> {
        let config = self.resolve_config()?;
        config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => transport::for_config(&config)?,
        };

        let mut backoff = config.backoff_policy();
        if let Some(jitter) = self.jitter {
            backoff = backoff.with_shared_jitter(jitter);
        }

        Ok(Connection::from_parts(
            config,
            transport,
            backoff,
            self.dispatcher,
            self.callbacks,
        ))
    }

    /// Produces the configuration from either the override or the options.
    fn resolve_config(&self) -> Result<ConnectionConfig> {
        let mut config = match (&self.config, &self.endpoint) {
            (Some(config), _) => config.clone(),
            (None, Some(endpoint)) => ConnectionConfig::from_options(endpoint, &self.options)?,
            (None, None) => {
                return Err(Error::config(
                    "Stream endpoint is required. Use .endpoint() to set it.\n\
                     Example: Connection::builder().endpoint(\"wss://host/ws\")",
                ));
            }
        };

        if let Some(timeout) = self.connect_timeout {
            config = config.with_connect_timeout(timeout);
        }
        for (name, value) in &self.headers {
            config = config.with_header(name.as_str(), value.as_str());
        }
        for (name, value) in &self.credential_headers {
            config = config.with_credential_header(name.as_str(), value.as_str());
        }

        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
