//! Tests for counter sinks.

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct RecordingSink {
    count: AtomicUsize,
    names: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            names: Mutex::new(Vec::new()),
        }
    }
}

impl CounterSink for RecordingSink {
    fn increment(&self, counter: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(counter.to_string());
    }
}

#[test]
fn test_sink_receives_counter_names() {
    let sink = RecordingSink::new();
    sink.increment("orders.sent_messages");
    sink.increment("orders.received_messages");

    assert_eq!(sink.count.load(Ordering::SeqCst), 2);
    assert_eq!(
        *sink.names.lock().unwrap(),
        vec!["orders.sent_messages", "orders.received_messages"]
    );
}

#[test]
fn test_noop_sink_accepts_increments() {
    // Must not panic or block.
    NoOpCounterSink.increment("anything");
    TracingCounterSink.increment("anything");
}
