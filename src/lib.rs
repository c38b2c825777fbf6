//! # Messaging Runtime
//!
//! Pull-based messaging abstraction for queue-backed services, with an AWS
//! SQS implementation and an in-memory implementation for tests.
//!
//! This library provides:
//! - Backend-agnostic queue operations behind a single trait
//! - Lease-based message lifecycle (receive, renew, abandon, complete)
//! - Dead letter queue support
//! - A cancellable polling listen loop
//! - Operation counters through a pluggable sink
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all messaging operations
//! - [`message`] - Envelope, payload, and delivery reference structures
//! - [`capabilities`] - Per-backend operation support flags
//! - [`config`] - Connection and credential parameters
//! - [`queue`] - The queue contract and the receiver callback seam
//! - [`monitoring`] - Counter sinks
//! - [`backends`] - SQS and in-memory queue implementations

// Module declarations
pub mod backends;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod message;
pub mod monitoring;
pub mod queue;

// Re-export commonly used types at crate root for convenience
pub use backends::{MemoryMessageQueue, SqsMessageQueue};
pub use capabilities::MessagingCapabilities;
pub use config::{ConnectionParams, CredentialParams};
pub use error::MessagingError;
pub use message::{MessageEnvelope, MessageReference, Payload};
pub use monitoring::{CounterSink, NoOpCounterSink, TracingCounterSink};
pub use queue::{MessageQueue, MessageReceiver};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
