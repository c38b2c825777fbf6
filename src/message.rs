//! Message envelope, payload, and the opaque delivery reference.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Opaque backend-issued token required to act on a specific delivery
/// instance of a message.
///
/// A reference is owned exclusively by the envelope that received it. It is
/// never shared or copied between envelopes and is cleared exactly once when
/// the envelope is finalized (completed, abandoned, or dead-lettered).
#[derive(Debug, PartialEq, Eq)]
pub struct MessageReference(String);

impl MessageReference {
    pub(crate) fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The backend receipt token.
    pub fn token(&self) -> &str {
        &self.0
    }
}

/// Message content as carried on the wire.
///
/// Bodies that parse as structured JSON are kept structured; anything else is
/// preserved verbatim as opaque bytes. A message is never rejected because
/// its body is not parseable.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(Bytes),
}

impl Payload {
    /// Create a structured payload.
    pub fn json(value: Value) -> Self {
        Self::Json(value)
    }

    /// Create an opaque payload from text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Raw(Bytes::from(text.into()))
    }

    /// Convert a raw backend body into a payload, preserving unparseable
    /// bodies verbatim.
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice(body) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(Bytes::copy_from_slice(body)),
        }
    }

    /// Serialize the payload back to a wire body.
    pub fn to_body(&self) -> Vec<u8> {
        match self {
            Self::Json(value) => value.to_string().into_bytes(),
            Self::Raw(bytes) => bytes.to_vec(),
        }
    }

    /// Structured view, when the payload is JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Raw view, when the payload is opaque.
    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Self::Json(_) => None,
            Self::Raw(bytes) => Some(bytes),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A message together with its delivery metadata.
///
/// Producer-side envelopes have no `message_id`, `sent_time`, or `reference`;
/// all three are assigned when an envelope is materialized from a backend
/// receipt.
#[derive(Debug)]
pub struct MessageEnvelope {
    /// Backend-assigned identifier, set on receipt.
    pub message_id: Option<String>,
    /// Caller-supplied tracing token.
    pub correlation_id: Option<String>,
    /// Producer-supplied classification.
    pub message_type: Option<String>,
    /// Message content.
    pub payload: Payload,
    /// Stamped when the envelope is materialized from a backend receipt.
    pub sent_time: Option<DateTime<Utc>>,
    reference: Option<MessageReference>,
}

impl MessageEnvelope {
    /// Create a producer-side envelope.
    pub fn new(payload: Payload) -> Self {
        Self {
            message_id: None,
            correlation_id: None,
            message_type: None,
            payload,
            sent_time: None,
            reference: None,
        }
    }

    /// Set the message type classification.
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }

    /// Set the correlation id for tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Materialize an envelope from a backend receipt. Used by queue
    /// implementations; `sent_time` is stamped with the current time.
    pub fn received(
        message_id: Option<String>,
        payload: Payload,
        reference: MessageReference,
        message_type: Option<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            message_id,
            correlation_id,
            message_type,
            payload,
            sent_time: Some(Utc::now()),
            reference: Some(reference),
        }
    }

    /// The delivery reference, if the envelope has not been finalized.
    pub fn reference(&self) -> Option<&MessageReference> {
        self.reference.as_ref()
    }

    /// Clear and return the delivery reference. Finalization calls this
    /// exactly once; later calls return `None`.
    pub fn take_reference(&mut self) -> Option<MessageReference> {
        self.reference.take()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
