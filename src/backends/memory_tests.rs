//! Tests for the in-memory queue implementation.

use super::*;
use crate::monitoring::CounterSink;
use serde_json::json;

struct CountingSink {
    counts: Mutex<HashMap<String, usize>>,
}

impl CountingSink {
    fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, counter: &str) -> usize {
        *self.counts.lock().unwrap().get(counter).unwrap_or(&0)
    }
}

impl CounterSink for CountingSink {
    fn increment(&self, counter: &str) {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(counter.to_string())
            .or_insert(0) += 1;
    }
}

async fn open(queue: &MemoryMessageQueue, connection: ConnectionParams) {
    queue
        .open(&connection, &CredentialParams::new(), None)
        .await
        .unwrap();
}

struct IdleReceiver;

#[async_trait]
impl MessageReceiver for IdleReceiver {
    async fn receive_message(
        &self,
        _envelope: MessageEnvelope,
        _queue: &dyn MessageQueue,
    ) -> Result<(), MessagingError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed_in_order() {
    let queue = MemoryMessageQueue::new("orders");
    open(
        &queue,
        ConnectionParams::new().with_visibility_timeout_secs(0),
    )
    .await;

    queue
        .send(MessageEnvelope::new(Payload::text("first")))
        .await
        .unwrap();
    queue
        .send(MessageEnvelope::new(Payload::text("second")))
        .await
        .unwrap();

    // Zero visibility: the lease expires immediately.
    let envelope = queue.receive(Duration::zero()).await.unwrap().unwrap();
    assert_eq!(envelope.payload, Payload::text("first"));

    // Reclaimed to the front, ahead of "second".
    assert_eq!(queue.message_count().await.unwrap(), 2);
    let redelivered = queue.receive(Duration::zero()).await.unwrap().unwrap();
    assert_eq!(redelivered.payload, Payload::text("first"));
}

#[tokio::test]
async fn test_renew_lock_extends_the_lease() {
    let queue = MemoryMessageQueue::new("orders");
    open(
        &queue,
        ConnectionParams::new().with_visibility_timeout_secs(0),
    )
    .await;

    queue
        .send(MessageEnvelope::new(Payload::text("held")))
        .await
        .unwrap();
    let envelope = queue.receive(Duration::zero()).await.unwrap().unwrap();

    queue
        .renew_lock(&envelope, Duration::seconds(60))
        .await
        .unwrap();

    // The renewed lease keeps the message in flight.
    assert_eq!(queue.message_count().await.unwrap(), 0);
    assert!(queue.receive(Duration::zero()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_complete_by_peek_reference_removes_from_queue() {
    let queue = MemoryMessageQueue::new("orders");
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(MessageEnvelope::new(Payload::json(json!({"n": 1}))))
        .await
        .unwrap();
    queue
        .send(MessageEnvelope::new(Payload::json(json!({"n": 2}))))
        .await
        .unwrap();

    let mut batch = queue.peek_batch(2).await.unwrap();
    assert_eq!(batch.len(), 2);
    for envelope in &mut batch {
        queue.complete(envelope).await.unwrap();
    }
    assert_eq!(queue.message_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_dead_letter_chains_to_configured_queue() {
    let dead = Arc::new(MemoryMessageQueue::new("orders-dlq"));
    open(&dead, ConnectionParams::new()).await;

    let sink = Arc::new(CountingSink::new());
    let queue = MemoryMessageQueue::new("orders")
        .with_counters(Arc::clone(&sink) as Arc<dyn CounterSink>)
        .with_dead_letter(Arc::clone(&dead));
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(
            MessageEnvelope::new(Payload::json(json!({"bad": true})))
                .with_message_type("poison")
                .with_correlation_id("corr-7"),
        )
        .await
        .unwrap();

    let mut envelope = queue.receive(Duration::zero()).await.unwrap().unwrap();
    queue.move_to_dead_letter(&mut envelope).await.unwrap();
    assert!(envelope.reference().is_none());
    assert_eq!(sink.get("orders.dead_messages"), 1);

    // Gone from the source, waiting in the dead letter queue with its
    // metadata intact.
    assert_eq!(queue.message_count().await.unwrap(), 0);
    let moved = dead.receive(Duration::zero()).await.unwrap().unwrap();
    assert_eq!(moved.message_type.as_deref(), Some("poison"));
    assert_eq!(moved.correlation_id.as_deref(), Some("corr-7"));
    assert_eq!(moved.payload.as_json(), Some(&json!({"bad": true})));
}

#[tokio::test]
async fn test_dead_letter_without_chain_discards() {
    let queue = MemoryMessageQueue::new("orders");
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(MessageEnvelope::new(Payload::text("poison")))
        .await
        .unwrap();
    let mut envelope = queue.receive(Duration::zero()).await.unwrap().unwrap();
    queue.move_to_dead_letter(&mut envelope).await.unwrap();

    assert!(envelope.reference().is_none());
    assert_eq!(queue.message_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_dead_letter_fails_when_chain_is_closed() {
    let dead = Arc::new(MemoryMessageQueue::new("orders-dlq"));
    let queue = MemoryMessageQueue::new("orders").with_dead_letter(Arc::clone(&dead));
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(MessageEnvelope::new(Payload::text("poison")))
        .await
        .unwrap();
    let mut envelope = queue.receive(Duration::zero()).await.unwrap().unwrap();

    let err = queue.move_to_dead_letter(&mut envelope).await.unwrap_err();
    assert!(matches!(err, MessagingError::InvalidState { .. }));
    // Submission failed, so the envelope keeps its reference.
    assert!(envelope.reference().is_some());
}

#[tokio::test]
async fn test_clear_removes_everything() {
    let queue = MemoryMessageQueue::new("orders");
    open(&queue, ConnectionParams::new()).await;

    for n in 0..4 {
        queue
            .send(MessageEnvelope::new(Payload::json(json!({"n": n}))))
            .await
            .unwrap();
    }
    let _held = queue.receive(Duration::zero()).await.unwrap().unwrap();

    queue.clear().await.unwrap();
    assert_eq!(queue.message_count().await.unwrap(), 0);
    assert!(queue.receive(Duration::zero()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_receive_waits_for_arrival() {
    let queue = Arc::new(MemoryMessageQueue::new("orders"));
    open(&queue, ConnectionParams::new()).await;

    let sender = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            queue
                .send(MessageEnvelope::new(Payload::text("late")))
                .await
                .unwrap();
        })
    };

    let envelope = queue.receive(Duration::seconds(5)).await.unwrap();
    assert!(envelope.is_some());
    sender.await.unwrap();
}

#[tokio::test]
async fn test_counters_track_send_and_receive() {
    let sink = Arc::new(CountingSink::new());
    let queue =
        MemoryMessageQueue::new("orders").with_counters(Arc::clone(&sink) as Arc<dyn CounterSink>);
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(MessageEnvelope::new(Payload::text("a")))
        .await
        .unwrap();
    queue
        .send(MessageEnvelope::new(Payload::text("b")))
        .await
        .unwrap();
    let _first = queue.receive(Duration::zero()).await.unwrap().unwrap();
    // Peeks do not count as receives.
    let _peeked = queue.peek().await.unwrap();

    assert_eq!(sink.get("orders.sent_messages"), 2);
    assert_eq!(sink.get("orders.received_messages"), 1);
    assert_eq!(sink.get("orders.dead_messages"), 0);
}

#[tokio::test]
async fn test_cancelled_loop_keeps_its_slot_until_exit() {
    let queue = Arc::new(MemoryMessageQueue::new("orders"));
    open(&queue, ConnectionParams::new().with_interval_ms(200)).await;

    let listener = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.listen(Arc::new(IdleReceiver)).await })
    };
    // The loop registers, finds the queue empty, and sleeps out its interval.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    queue.end_listen();

    // Still winding down: a replacement listen must be rejected, otherwise
    // its stop signal would be stripped when the first loop exits.
    let err = queue.listen(Arc::new(IdleReceiver)).await.unwrap_err();
    assert!(matches!(err, MessagingError::InvalidState { .. }));

    listener.await.unwrap().unwrap();

    // After the first loop has exited, a fresh listen starts and remains
    // cancellable.
    let listener = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.listen(Arc::new(IdleReceiver)).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    queue.end_listen();
    tokio::time::timeout(std::time::Duration::from_secs(2), listener)
        .await
        .expect("cancelled loop must exit")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_repeated_peeks_reuse_a_single_token_slot() {
    let queue = MemoryMessageQueue::new("orders");
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(MessageEnvelope::new(Payload::text("steady")))
        .await
        .unwrap();
    for _ in 0..5 {
        assert!(queue.peek().await.unwrap().is_some());
    }
    assert_eq!(queue.storage().peeked.len(), 1);

    // Once the message leaves the available queue its peek token is evicted.
    let mut envelope = queue.receive(Duration::zero()).await.unwrap().unwrap();
    queue.complete(&mut envelope).await.unwrap();
    assert_eq!(queue.message_count().await.unwrap(), 0);
    assert_eq!(queue.storage().peeked.len(), 0);
}

#[tokio::test]
async fn test_message_ids_are_unique() {
    let queue = MemoryMessageQueue::new("orders");
    open(&queue, ConnectionParams::new()).await;

    queue
        .send(MessageEnvelope::new(Payload::text("a")))
        .await
        .unwrap();
    queue
        .send(MessageEnvelope::new(Payload::text("b")))
        .await
        .unwrap();

    let batch = queue.peek_batch(2).await.unwrap();
    assert_ne!(batch[0].message_id, batch[1].message_id);
}
