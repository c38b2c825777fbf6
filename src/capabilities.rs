//! Static capability descriptor for queue implementations.

/// Declares which optional operations a queue implementation supports.
///
/// Constructed once by the queue implementation and never mutated afterwards.
/// Consumers branch on these flags to fail fast instead of attempting an
/// operation and catching "unsupported" at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessagingCapabilities {
    pub can_message_count: bool,
    pub can_send: bool,
    pub can_receive: bool,
    pub can_peek: bool,
    pub can_peek_batch: bool,
    pub can_renew_lock: bool,
    pub can_abandon: bool,
    pub can_complete: bool,
    pub can_dead_letter: bool,
    pub can_listen: bool,
    pub can_clear: bool,
}

impl MessagingCapabilities {
    /// Descriptor with every operation supported.
    pub fn all() -> Self {
        Self {
            can_message_count: true,
            can_send: true,
            can_receive: true,
            can_peek: true,
            can_peek_batch: true,
            can_renew_lock: true,
            can_abandon: true,
            can_complete: true,
            can_dead_letter: true,
            can_listen: true,
            can_clear: true,
        }
    }
}

#[cfg(test)]
#[path = "capabilities_tests.rs"]
mod tests;
