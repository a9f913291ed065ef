//! Connection configuration.
//!
//! [`ConnectionConfig`] is the immutable per-connection configuration.
//! [`ConnectionOptions`] is the serde-facing option surface, using the same
//! camelCase names the web clients pass around:
//!
//! ```json
//! {
//!   "reconnect": true,
//!   "reconnectInterval": 1000,
//!   "maxReconnectAttempts": 5,
//!   "maxReconnectDelay": 30000,
//!   "withCredentials": true
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use resilient_stream::{ConnectionConfig, CredentialsMode};
//!
//! # fn example() -> resilient_stream::Result<()> {
//! let config = ConnectionConfig::new("wss://api.example.com/ws/workflows/42")?
//!     .with_reconnect_interval(Duration::from_millis(500))
//!     .with_max_reconnect_attempts(3)
//!     .with_credentials(CredentialsMode::Include)
//!     .with_credential_header("Authorization", "Bearer token");
//!
//! assert_eq!(config.max_attempts(), 3);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use url::Url;

use crate::backoff::{BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_JITTER_BOUND, DEFAULT_MAX_DELAY};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default timeout for opening a transport handle.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// CredentialsMode
// ============================================================================

/// Whether credentials accompany the stream request.
///
/// Mirrors the browser `withCredentials` flag: with [`Include`](Self::Include)
/// the configured credential headers (cookies, authorization) are sent, with
/// [`Omit`](Self::Omit) they are never sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialsMode {
    /// Never send credential headers.
    #[default]
    Omit,
    /// Send credential headers.
    Include,
}

impl From<bool> for CredentialsMode {
    fn from(with_credentials: bool) -> Self {
        if with_credentials {
            Self::Include
        } else {
            Self::Omit
        }
    }
}

// ============================================================================
// TransportKind
// ============================================================================

/// Transport family selected from the endpoint scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Bidirectional socket (`ws://`, `wss://`).
    WebSocket,
    /// One-directional event stream (`http://`, `https://`).
    EventStream,
}

impl TransportKind {
    /// Maps a URL scheme to a transport kind.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "ws" | "wss" => Some(Self::WebSocket),
            "http" | "https" => Some(Self::EventStream),
            _ => None,
        }
    }
}

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Recognized connection options, as supplied by UI code or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    /// Enables automatic reconnection.
    pub reconnect: bool,
    /// Base reconnect delay in milliseconds.
    pub reconnect_interval: u64,
    /// Maximum number of reconnect attempts.
    pub max_reconnect_attempts: u32,
    /// Ceiling for a single reconnect delay in milliseconds.
    pub max_reconnect_delay: u64,
    /// Include cookies/auth on the transport.
    pub with_credentials: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            reconnect: true,
            reconnect_interval: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
            max_reconnect_delay: DEFAULT_MAX_DELAY.as_millis() as u64,
            with_credentials: false,
        }
    }
}

impl ConnectionOptions {
    /// Parses options from a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is not valid options JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Immutable configuration of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Stream endpoint.
    endpoint: Url,
    /// Credentials mode.
    credentials: CredentialsMode,
    /// Automatic reconnection enabled.
    reconnect: bool,
    /// Base reconnect delay.
    base_delay: Duration,
    /// Reconnect delay ceiling.
    max_delay: Duration,
    /// Reconnect attempt cap.
    max_attempts: u32,
    /// Exclusive bound of the jitter term.
    jitter_bound: Duration,
    /// Timeout for opening a transport handle.
    connect_timeout: Duration,
    /// Headers sent on every stream request.
    headers: Vec<(String, String)>,
    /// Headers sent only with [`CredentialsMode::Include`].
    credential_headers: Vec<(String, String)>,
}

// ============================================================================
// ConnectionConfig - Constructors
// ============================================================================

impl ConnectionConfig {
    /// Creates a configuration with default reconnect settings.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `endpoint` is not a URL
    /// - [`Error::InvalidEndpoint`] if the scheme is not ws, wss, http or https
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)?;
        if TransportKind::from_scheme(endpoint.scheme()).is_none() {
            return Err(Error::invalid_endpoint(
                endpoint.as_str(),
                format!("unsupported scheme '{}'", endpoint.scheme()),
            ));
        }

        Ok(Self {
            endpoint,
            credentials: CredentialsMode::Omit,
            reconnect: true,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_bound: DEFAULT_JITTER_BOUND,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            headers: Vec::new(),
            credential_headers: Vec::new(),
        })
    }

    /// Creates a configuration from the recognized option surface.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_options(endpoint: &str, options: &ConnectionOptions) -> Result<Self> {
        Ok(Self::new(endpoint)?
            .with_reconnect(options.reconnect)
            .with_reconnect_interval(Duration::from_millis(options.reconnect_interval))
            .with_max_reconnect_delay(Duration::from_millis(options.max_reconnect_delay))
            .with_max_reconnect_attempts(options.max_reconnect_attempts)
            .with_credentials(CredentialsMode::from(options.with_credentials)))
    }
}

// ============================================================================
// ConnectionConfig - Builder Methods
// ============================================================================

impl ConnectionConfig {
    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Sets the base reconnect delay.
    #[inline]
    #[must_use]
    pub const fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.base_delay = interval;
        self
    }

    /// Sets the ceiling for a single reconnect delay.
    #[inline]
    #[must_use]
    pub const fn with_max_reconnect_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Sets the maximum number of reconnect attempts.
    #[inline]
    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the exclusive bound of the jitter term.
    #[inline]
    #[must_use]
    pub const fn with_jitter_bound(mut self, bound: Duration) -> Self {
        self.jitter_bound = bound;
        self
    }

    /// Sets the timeout for opening a transport handle.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the credentials mode.
    #[inline]
    #[must_use]
    pub const fn with_credentials(mut self, mode: CredentialsMode) -> Self {
        self.credentials = mode;
        self
    }

    /// Adds a header sent on every stream request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Adds a credential header, sent only with [`CredentialsMode::Include`].
    #[must_use]
    pub fn with_credential_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.credential_headers.push((name.into(), value.into()));
        self
    }
}

// ============================================================================
// ConnectionConfig - Accessors
// ============================================================================

impl ConnectionConfig {
    /// Stream endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Credentials mode.
    #[inline]
    #[must_use]
    pub const fn credentials(&self) -> CredentialsMode {
        self.credentials
    }

    /// Whether automatic reconnection is enabled.
    #[inline]
    #[must_use]
    pub const fn reconnect(&self) -> bool {
        self.reconnect
    }

    /// Base reconnect delay.
    #[inline]
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Reconnect delay ceiling.
    #[inline]
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Reconnect attempt cap.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Timeout for opening a transport handle.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Transport family implied by the endpoint scheme.
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        // Scheme validated in `new`
        TransportKind::from_scheme(self.endpoint.scheme()).unwrap_or(TransportKind::EventStream)
    }

    /// Headers to send with a stream request, honoring the credentials mode.
    pub fn request_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        let credentials: &[(String, String)] = match self.credentials {
            CredentialsMode::Include => &self.credential_headers,
            CredentialsMode::Omit => &[],
        };
        self.headers
            .iter()
            .chain(credentials.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Backoff policy derived from the delay settings.
    #[must_use]
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.base_delay, self.max_delay).with_jitter_bound(self.jitter_bound)
    }

    /// Checks the delay settings for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the ceiling is below the base delay, the
    /// connect timeout is zero, or a header name or value is not valid HTTP.
    pub fn validate(&self) -> Result<()> {
        if self.max_delay < self.base_delay {
            return Err(Error::config(format!(
                "maxReconnectDelay ({}ms) is below reconnectInterval ({}ms)",
                self.max_delay.as_millis(),
                self.base_delay.as_millis()
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be greater than zero"));
        }
        for (name, value) in self.headers.iter().chain(&self.credential_headers) {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::config(format!("invalid header name '{name}': {e}")))?;
            HeaderValue::from_str(value)
                .map_err(|e| Error::config(format!("invalid value for header '{name}': {e}")))?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("ws://localhost:8000/ws").expect("config");
        assert!(config.reconnect());
        assert_eq!(config.base_delay(), Duration::from_millis(1000));
        assert_eq!(config.max_delay(), Duration::from_millis(30_000));
        assert_eq!(config.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.credentials(), CredentialsMode::Omit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transport_kind_from_scheme() {
        let ws = ConnectionConfig::new("wss://example.com/ws").expect("config");
        let sse = ConnectionConfig::new("https://example.com/events").expect("config");
        assert_eq!(ws.transport_kind(), TransportKind::WebSocket);
        assert_eq!(sse.transport_kind(), TransportKind::EventStream);
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        let err = ConnectionConfig::new("ftp://example.com/file").unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_rejects_garbage_endpoint() {
        let err = ConnectionConfig::new("not a url").unwrap_err();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_credential_headers_follow_mode() {
        let config = ConnectionConfig::new("https://example.com/events")
            .expect("config")
            .with_header("X-Tenant", "acme")
            .with_credential_header("Authorization", "Bearer t");

        let omitted: Vec<_> = config.request_headers().collect();
        assert_eq!(omitted, vec![("X-Tenant", "acme")]);

        let config = config.with_credentials(CredentialsMode::Include);
        let included: Vec<_> = config.request_headers().collect();
        assert_eq!(
            included,
            vec![("X-Tenant", "acme"), ("Authorization", "Bearer t")]
        );
    }

    #[test]
    fn test_validate_rejects_invalid_headers() {
        let config = ConnectionConfig::new("wss://example.com/ws").expect("config");

        let bad_name = config.clone().with_header("X Tenant", "acme");
        assert!(matches!(bad_name.validate(), Err(Error::Config { .. })));

        // Credential headers are checked even while omitted
        let bad_value = config.with_credential_header("Authorization", "Bearer\nt");
        assert!(matches!(bad_value.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_options_from_json_camel_case() {
        let options = ConnectionOptions::from_json(
            r#"{"reconnectInterval": 250, "maxReconnectAttempts": 3, "withCredentials": true}"#,
        )
        .expect("options");

        assert!(options.reconnect);
        assert_eq!(options.reconnect_interval, 250);
        assert_eq!(options.max_reconnect_attempts, 3);
        assert_eq!(options.max_reconnect_delay, 30_000);
        assert!(options.with_credentials);
    }

    #[test]
    fn test_config_from_options() {
        let options = ConnectionOptions {
            reconnect: false,
            reconnect_interval: 500,
            max_reconnect_attempts: 2,
            max_reconnect_delay: 4000,
            with_credentials: true,
        };
        let config =
            ConnectionConfig::from_options("ws://localhost/ws", &options).expect("config");

        assert!(!config.reconnect());
        assert_eq!(config.base_delay(), Duration::from_millis(500));
        assert_eq!(config.max_delay(), Duration::from_millis(4000));
        assert_eq!(config.max_attempts(), 2);
        assert_eq!(config.credentials(), CredentialsMode::Include);
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let config = ConnectionConfig::new("ws://localhost/ws")
            .expect("config")
            .with_reconnect_interval(Duration::from_secs(10))
            .with_max_reconnect_delay(Duration::from_secs(1));
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }
}
