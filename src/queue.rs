//! The message queue contract and the receiver callback seam.

use crate::capabilities::MessagingCapabilities;
use crate::config::{ConnectionParams, CredentialParams};
use crate::error::MessagingError;
use crate::message::MessageEnvelope;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;

/// Callback invoked by a listen loop for each received envelope.
///
/// The receiver is solely responsible for eventually completing, abandoning,
/// or dead-lettering the envelope; the loop never finalizes on the caller's
/// behalf. Errors returned here are logged and swallowed by the loop so one
/// bad message cannot halt the consumer.
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    async fn receive_message(
        &self,
        envelope: MessageEnvelope,
        queue: &dyn MessageQueue,
    ) -> Result<(), MessagingError>;
}

/// Operation contract every backend-specific queue implements.
///
/// A queue is constructed closed. `open` resolves and provisions backend
/// resources; every data operation requires open state and fails with
/// `InvalidState` otherwise, without mutating backend state. `close` signals
/// cancellation to a running listen loop and transitions back to closed.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Logical queue name.
    fn name(&self) -> &str;

    /// Operations this implementation supports.
    fn capabilities(&self) -> &MessagingCapabilities;

    async fn is_open(&self) -> bool;

    /// Resolve parameters, provision backend resources (idempotently), and
    /// transition to open. No partial state is left behind on failure.
    async fn open(
        &self,
        connection: &ConnectionParams,
        credentials: &CredentialParams,
        correlation_id: Option<&str>,
    ) -> Result<(), MessagingError>;

    /// Signal cancellation to any running listen loop and transition to closed.
    async fn close(&self, correlation_id: Option<&str>) -> Result<(), MessagingError>;

    /// Approximate count of available envelopes. Eventually consistent.
    async fn message_count(&self) -> Result<u64, MessagingError>;

    /// Serialize and submit an envelope. Increments the sent counter.
    async fn send(&self, envelope: MessageEnvelope) -> Result<(), MessagingError>;

    /// Non-destructively view one available envelope with a zero-length
    /// lease. Never blocks waiting for new arrivals.
    async fn peek(&self) -> Result<Option<MessageEnvelope>, MessagingError>;

    /// Non-destructively view up to `max_count` available envelopes, in
    /// order, with zero-length leases. Never blocks waiting for arrivals.
    async fn peek_batch(&self, max_count: usize) -> Result<Vec<MessageEnvelope>, MessagingError>;

    /// Retrieve at most one envelope under the default lease, blocking up to
    /// `wait_timeout` for availability.
    async fn receive(&self, wait_timeout: Duration) -> Result<Option<MessageEnvelope>, MessagingError>;

    /// Extend the lease on an in-flight envelope. No-op when the envelope's
    /// reference has already been cleared.
    async fn renew_lock(
        &self,
        envelope: &MessageEnvelope,
        lease: Duration,
    ) -> Result<(), MessagingError>;

    /// Release the lease immediately, making the envelope redeliverable.
    /// Clears the envelope's reference.
    async fn abandon(&self, envelope: &mut MessageEnvelope) -> Result<(), MessagingError>;

    /// Permanently remove the envelope from the queue. Clears the envelope's
    /// reference.
    async fn complete(&self, envelope: &mut MessageEnvelope) -> Result<(), MessagingError>;

    /// Relocate the envelope to the configured dead-letter queue, or discard
    /// it with a warning when none is configured, then remove it from the
    /// source queue. Clears the envelope's reference.
    async fn move_to_dead_letter(&self, envelope: &mut MessageEnvelope)
        -> Result<(), MessagingError>;

    /// Run the polling loop until cancelled, handing each envelope to
    /// `receiver`. Starting a second loop while one is running is an error.
    async fn listen(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), MessagingError>;

    /// Signal cancellation for the running listen loop, if any.
    fn end_listen(&self);

    /// Remove all envelopes from the queue.
    async fn clear(&self) -> Result<(), MessagingError>;
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
