//! Inbound message type and frame decoding.
//!
//! Every frame the server pushes is a JSON object discriminated by a `type`
//! field. The rest of the object is the kind-specific body.
//!
//! # Format
//!
//! ```json
//! {
//!   "type": "node_completed",
//!   "execution_id": "exec-7",
//!   "node_id": "llm-1",
//!   "output": { ... }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Name of the discriminant field.
pub const DISCRIMINANT_FIELD: &str = "type";

// ============================================================================
// InboundMessage
// ============================================================================

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message kind from the `type` field.
    #[serde(rename = "type")]
    pub kind: String,

    /// Kind-specific fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl InboundMessage {
    /// Creates a message from a kind and body.
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// Decodes one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the frame is not a JSON object
    /// or lacks a string `type` field.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::malformed_frame(format!("invalid JSON: {e}")))?;

        let Value::Object(mut body) = value else {
            return Err(Error::malformed_frame("expected a JSON object"));
        };

        match body.remove(DISCRIMINANT_FIELD) {
            Some(Value::String(kind)) => Ok(Self { kind, body }),
            Some(other) => Err(Error::malformed_frame(format!(
                "'{DISCRIMINANT_FIELD}' must be a string, got {other}"
            ))),
            None => Err(Error::malformed_frame(format!(
                "missing '{DISCRIMINANT_FIELD}' field"
            ))),
        }
    }

    /// Returns the payload value.
    ///
    /// Servers nest the body under `data` or `payload` in some streams; when
    /// neither is present the whole body is the payload.
    #[must_use]
    pub fn payload(&self) -> Value {
        self.body
            .get("data")
            .or_else(|| self.body.get("payload"))
            .cloned()
            .unwrap_or_else(|| Value::Object(self.body.clone()))
    }

    /// Deserializes the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload())?)
    }

    /// Gets a field as a string slice.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    /// Gets a field as an owned string, empty if absent.
    #[inline]
    pub(crate) fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    /// Gets a field as an optional owned string.
    #[inline]
    pub(crate) fn get_optional_string(&self, key: &str) -> Option<String> {
        self.get_str(key).map(str::to_string)
    }

    /// Gets a field as a u64, zero if absent.
    #[inline]
    pub(crate) fn get_u64(&self, key: &str) -> u64 {
        self.body
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or_default()
    }

    /// Gets a field as a raw value, null if absent.
    #[inline]
    pub(crate) fn get_value(&self, key: &str) -> Value {
        self.body.get(key).cloned().unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================
