//! Counter emission for queue operations.
//!
//! Queues emit named counters (`<queue>.sent_messages`,
//! `<queue>.received_messages`, `<queue>.dead_messages`) through a sink
//! trait. Sinks are best-effort: counter recording never blocks or fails a
//! queue operation. Infrastructure layers supply real collectors; tests and
//! defaults use the implementations here.

/// Sink for named operation counters.
///
/// All methods take `&self` so sinks can be shared as `Arc<dyn CounterSink>`
/// across async tasks. Implementations must be thread-safe.
pub trait CounterSink: Send + Sync {
    /// Record a single increment of `counter`.
    fn increment(&self, counter: &str);
}

/// Sink that discards every counter.
pub struct NoOpCounterSink;

impl CounterSink for NoOpCounterSink {
    fn increment(&self, _counter: &str) {}
}

/// Sink that emits counters as debug-level trace events.
pub struct TracingCounterSink;

impl CounterSink for TracingCounterSink {
    fn increment(&self, counter: &str) {
        tracing::debug!(counter, "counter incremented");
    }
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
