//! In-memory queue implementation for testing and development.
//!
//! Fully functional: lease-based delivery with visibility timeouts,
//! zero-lease peeks, an optional chained dead-letter queue, and the same
//! cancellable listen loop as the real backends. Intended for unit testing
//! consumers of the [`MessageQueue`] contract and for prototyping.

use crate::capabilities::MessagingCapabilities;
use crate::config::{ConnectionParams, CredentialParams, DEFAULT_POLL_INTERVAL_MS, DEFAULT_VISIBILITY_TIMEOUT_SECS};
use crate::error::MessagingError;
use crate::message::{MessageEnvelope, MessageReference, Payload};
use crate::monitoring::{CounterSink, NoOpCounterSink};
use crate::queue::{MessageQueue, MessageReceiver};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use uuid::Uuid;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Poll granularity while a receive call waits for an arrival.
const RECEIVE_POLL: std::time::Duration = std::time::Duration::from_millis(20);

/// A message held by the queue.
struct StoredMessage {
    message_id: String,
    message_type: Option<String>,
    correlation_id: Option<String>,
    payload: Payload,
}

/// A delivery instance currently leased to a consumer.
struct LeasedMessage {
    message: StoredMessage,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Storage {
    available: VecDeque<StoredMessage>,
    /// Receipt token to in-flight lease.
    leased: HashMap<String, LeasedMessage>,
    /// Receipt tokens handed out by zero-lease peeks, mapped to message ids.
    peeked: HashMap<String, String>,
}

impl Storage {
    /// Return expired leases to the front of the available queue.
    fn reclaim_expired(&mut self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();
        for token in expired {
            if let Some(lease) = self.leased.remove(&token) {
                self.available.push_front(lease.message);
            }
        }
        // Peek tokens are only valid while their message is still available.
        let available = &self.available;
        self.peeked
            .retain(|_, id| available.iter().any(|message| &message.message_id == id));
    }

    /// Remove the message a receipt token points at, whether leased or peeked.
    fn remove_by_token(&mut self, token: &str) -> Option<StoredMessage> {
        if let Some(lease) = self.leased.remove(token) {
            return Some(lease.message);
        }
        if let Some(message_id) = self.peeked.remove(token) {
            if let Some(position) = self
                .available
                .iter()
                .position(|message| message.message_id == message_id)
            {
                return self.available.remove(position);
            }
        }
        None
    }
}

/// In-memory [`MessageQueue`] implementation.
///
/// # Example
///
/// ```rust
/// use messaging_runtime::{
///     ConnectionParams, CredentialParams, MemoryMessageQueue, MessageEnvelope, MessageQueue,
///     Payload,
/// };
///
/// # tokio_test::block_on(async {
/// let queue = MemoryMessageQueue::new("orders");
/// queue
///     .open(&ConnectionParams::new(), &CredentialParams::new(), None)
///     .await
///     .unwrap();
///
/// queue
///     .send(MessageEnvelope::new(Payload::text("hello")))
///     .await
///     .unwrap();
/// assert_eq!(queue.message_count().await.unwrap(), 1);
/// # });
/// ```
pub struct MemoryMessageQueue {
    name: String,
    capabilities: MessagingCapabilities,
    counters: Arc<dyn CounterSink>,
    dead_letter: Option<Arc<MemoryMessageQueue>>,
    opened: AtomicBool,
    poll_interval: Mutex<std::time::Duration>,
    visibility_timeout: Mutex<Duration>,
    storage: Mutex<Storage>,
    listen_stop: Mutex<Option<watch::Sender<bool>>>,
}

impl MemoryMessageQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: MessagingCapabilities::all(),
            counters: Arc::new(NoOpCounterSink),
            dead_letter: None,
            opened: AtomicBool::new(false),
            poll_interval: Mutex::new(std::time::Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            visibility_timeout: Mutex::new(Duration::seconds(DEFAULT_VISIBILITY_TIMEOUT_SECS)),
            storage: Mutex::new(Storage::default()),
            listen_stop: Mutex::new(None),
        }
    }

    /// Replace the counter sink.
    pub fn with_counters(mut self, counters: Arc<dyn CounterSink>) -> Self {
        self.counters = counters;
        self
    }

    /// Chain a dead-letter queue. The dead-letter queue must itself be open
    /// for `move_to_dead_letter` to succeed.
    pub fn with_dead_letter(mut self, queue: Arc<MemoryMessageQueue>) -> Self {
        self.dead_letter = Some(queue);
        self
    }

    fn ensure_open(&self, operation: &str) -> Result<(), MessagingError> {
        if self.opened.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::invalid_state(
                &self.name,
                format!("queue is not open; call open before {operation}"),
            ))
        }
    }

    fn storage(&self) -> std::sync::MutexGuard<'_, Storage> {
        self.storage.lock().expect("storage lock poisoned")
    }

    /// Lease the front message, if one is available.
    fn try_lease(&self) -> Option<MessageEnvelope> {
        let visibility = *self
            .visibility_timeout
            .lock()
            .expect("visibility lock poisoned");
        let mut storage = self.storage();
        storage.reclaim_expired();
        let message = storage.available.pop_front()?;
        let token = Uuid::new_v4().to_string();
        let envelope = envelope_from(&message, MessageReference::new(token.clone()));
        storage.leased.insert(
            token,
            LeasedMessage {
                message,
                expires_at: Utc::now() + visibility,
            },
        );
        Some(envelope)
    }
}

fn envelope_from(message: &StoredMessage, reference: MessageReference) -> MessageEnvelope {
    MessageEnvelope::received(
        Some(message.message_id.clone()),
        message.payload.clone(),
        reference,
        message.message_type.clone(),
        message.correlation_id.clone(),
    )
}

#[async_trait]
impl MessageQueue for MemoryMessageQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &MessagingCapabilities {
        &self.capabilities
    }

    async fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    async fn open(
        &self,
        connection: &ConnectionParams,
        _credentials: &CredentialParams,
        _correlation_id: Option<&str>,
    ) -> Result<(), MessagingError> {
        if let Some(interval_ms) = connection.interval_ms {
            *self.poll_interval.lock().expect("interval lock poisoned") =
                std::time::Duration::from_millis(interval_ms);
        }
        if let Some(secs) = connection.visibility_timeout_secs {
            *self
                .visibility_timeout
                .lock()
                .expect("visibility lock poisoned") = Duration::seconds(secs.max(0));
        }
        self.opened.store(true, Ordering::SeqCst);
        debug!(queue = %self.name, "memory queue opened");
        Ok(())
    }

    async fn close(&self, _correlation_id: Option<&str>) -> Result<(), MessagingError> {
        self.end_listen();
        self.opened.store(false, Ordering::SeqCst);
        debug!(queue = %self.name, "memory queue closed");
        Ok(())
    }

    async fn message_count(&self) -> Result<u64, MessagingError> {
        self.ensure_open("message_count")?;
        let mut storage = self.storage();
        storage.reclaim_expired();
        Ok(storage.available.len() as u64)
    }

    async fn send(&self, envelope: MessageEnvelope) -> Result<(), MessagingError> {
        self.ensure_open("send")?;
        let message = StoredMessage {
            message_id: Uuid::new_v4().to_string(),
            message_type: envelope.message_type,
            correlation_id: envelope.correlation_id,
            payload: envelope.payload,
        };
        self.storage().available.push_back(message);
        self.counters
            .increment(&format!("{}.sent_messages", self.name));
        trace!(queue = %self.name, "message stored");
        Ok(())
    }

    async fn peek(&self) -> Result<Option<MessageEnvelope>, MessagingError> {
        self.ensure_open("peek")?;
        let mut batch = self.peek_batch(1).await?;
        Ok(batch.pop())
    }

    async fn peek_batch(&self, max_count: usize) -> Result<Vec<MessageEnvelope>, MessagingError> {
        self.ensure_open("peek_batch")?;
        let mut storage = self.storage();
        storage.reclaim_expired();
        let mut envelopes = Vec::new();
        let mut tokens = Vec::new();
        for message in storage.available.iter().take(max_count) {
            let token = Uuid::new_v4().to_string();
            envelopes.push(envelope_from(message, MessageReference::new(token.clone())));
            tokens.push((token, message.message_id.clone()));
        }
        for (token, message_id) in tokens {
            // Latest peek token wins; repeated polling must not accumulate
            // one entry per call.
            storage.peeked.retain(|_, id| id != &message_id);
            storage.peeked.insert(token, message_id);
        }
        Ok(envelopes)
    }

    async fn receive(
        &self,
        wait_timeout: Duration,
    ) -> Result<Option<MessageEnvelope>, MessagingError> {
        self.ensure_open("receive")?;
        let deadline =
            tokio::time::Instant::now() + wait_timeout.to_std().unwrap_or_default();
        loop {
            if let Some(envelope) = self.try_lease() {
                self.counters
                    .increment(&format!("{}.received_messages", self.name));
                return Ok(Some(envelope));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(RECEIVE_POLL).await;
        }
    }

    async fn renew_lock(
        &self,
        envelope: &MessageEnvelope,
        lease: Duration,
    ) -> Result<(), MessagingError> {
        self.ensure_open("renew_lock")?;
        let Some(reference) = envelope.reference() else {
            trace!(queue = %self.name, "no reference to renew");
            return Ok(());
        };
        if let Some(leased) = self.storage().leased.get_mut(reference.token()) {
            leased.expires_at = Utc::now() + lease;
        }
        Ok(())
    }

    async fn abandon(&self, envelope: &mut MessageEnvelope) -> Result<(), MessagingError> {
        self.ensure_open("abandon")?;
        let Some(reference) = envelope.reference() else {
            return Ok(());
        };
        {
            let mut storage = self.storage();
            if let Some(lease) = storage.leased.remove(reference.token()) {
                storage.available.push_front(lease.message);
            }
        }
        envelope.take_reference();
        trace!(queue = %self.name, message_id = ?envelope.message_id, "message abandoned");
        Ok(())
    }

    async fn complete(&self, envelope: &mut MessageEnvelope) -> Result<(), MessagingError> {
        self.ensure_open("complete")?;
        let Some(reference) = envelope.reference() else {
            return Ok(());
        };
        self.storage().remove_by_token(reference.token());
        envelope.take_reference();
        trace!(queue = %self.name, message_id = ?envelope.message_id, "message completed");
        Ok(())
    }

    async fn move_to_dead_letter(
        &self,
        envelope: &mut MessageEnvelope,
    ) -> Result<(), MessagingError> {
        self.ensure_open("move_to_dead_letter")?;
        let Some(reference) = envelope.reference() else {
            return Ok(());
        };
        match &self.dead_letter {
            Some(dead_letter) => {
                let mut copy = MessageEnvelope::new(envelope.payload.clone());
                copy.message_type = envelope.message_type.clone();
                copy.correlation_id = envelope.correlation_id.clone();
                dead_letter.send(copy).await?;
            }
            None => warn!(
                queue = %self.name,
                message_id = ?envelope.message_id,
                "no dead letter queue configured; discarding message"
            ),
        }
        self.storage().remove_by_token(reference.token());
        envelope.take_reference();
        self.counters
            .increment(&format!("{}.dead_messages", self.name));
        Ok(())
    }

    async fn listen(&self, receiver: Arc<dyn MessageReceiver>) -> Result<(), MessagingError> {
        self.ensure_open("listen")?;
        let interval = *self.poll_interval.lock().expect("interval lock poisoned");
        let stop_rx = {
            let mut slot = self.listen_stop.lock().expect("listen state lock poisoned");
            if slot.is_some() {
                return Err(MessagingError::invalid_state(
                    &self.name,
                    "a listen loop is already running",
                ));
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            *slot = Some(stop_tx);
            stop_rx
        };
        debug!(queue = %self.name, "listen loop started");
        while !*stop_rx.borrow() {
            match self.receive(Duration::zero()).await {
                Ok(Some(envelope)) => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    if let Err(err) = receiver.receive_message(envelope, self).await {
                        warn!(queue = %self.name, error = %err, "message receiver failed; continuing");
                    }
                }
                Ok(None) => tokio::time::sleep(interval).await,
                Err(err) => {
                    warn!(queue = %self.name, error = %err, "receive failed while listening");
                    tokio::time::sleep(interval).await;
                }
            }
        }
        self.listen_stop
            .lock()
            .expect("listen state lock poisoned")
            .take();
        debug!(queue = %self.name, "listen loop stopped");
        Ok(())
    }

    fn end_listen(&self) {
        // Signal without vacating the slot: only the loop clears it on exit,
        // so a second listen is rejected while the first is winding down.
        if let Ok(slot) = self.listen_stop.lock() {
            if let Some(stop) = slot.as_ref() {
                let _ = stop.send(true);
            }
        }
    }

    async fn clear(&self) -> Result<(), MessagingError> {
        self.ensure_open("clear")?;
        let mut storage = self.storage();
        storage.available.clear();
        storage.leased.clear();
        storage.peeked.clear();
        debug!(queue = %self.name, "queue cleared");
        Ok(())
    }
}
