//! Error types for queue operations.

use thiserror::Error;

/// Error type covering every operation of the messaging runtime
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Invalid configuration: {message}")]
    Configuration {
        correlation_id: Option<String>,
        message: String,
    },

    #[error("Connection to queue '{queue}' failed: {message}")]
    Connection { queue: String, message: String },

    #[error("Invalid state for queue '{queue}': {message}")]
    InvalidState { queue: String, message: String },

    #[error("Backend error {code}: {message}")]
    Backend { code: String, message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },
}

impl MessagingError {
    /// Configuration failure raised during open, tagged with the caller's
    /// correlation id when one was supplied.
    pub fn configuration(correlation_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::Configuration {
            correlation_id: correlation_id.map(str::to_string),
            message: message.into(),
        }
    }

    /// Connectivity or provisioning failure carrying the attempted queue identity.
    pub fn connection(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            queue: queue.into(),
            message: message.into(),
        }
    }

    /// Operation attempted against a queue that is not in the required lifecycle state.
    pub fn invalid_state(queue: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidState {
            queue: queue.into(),
            message: message.into(),
        }
    }

    /// Error surfaced by the backend service, keyed by its error code.
    pub fn backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire encode/decode failure.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Configuration { .. } => false,
            Self::Connection { .. } => true,
            Self::InvalidState { .. } => false,
            Self::Backend { .. } => true,
            Self::Serialization { .. } => false,
        }
    }

    /// Backend error code, when this error originated from the backend service.
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            Self::Backend { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
