//! Tests for the capability descriptor.

use super::*;

#[test]
fn test_default_supports_nothing() {
    let capabilities = MessagingCapabilities::default();
    assert!(!capabilities.can_send);
    assert!(!capabilities.can_receive);
    assert!(!capabilities.can_listen);
    assert!(!capabilities.can_clear);
}

#[test]
fn test_all_supports_everything() {
    let capabilities = MessagingCapabilities::all();
    assert!(capabilities.can_message_count);
    assert!(capabilities.can_send);
    assert!(capabilities.can_receive);
    assert!(capabilities.can_peek);
    assert!(capabilities.can_peek_batch);
    assert!(capabilities.can_renew_lock);
    assert!(capabilities.can_abandon);
    assert!(capabilities.can_complete);
    assert!(capabilities.can_dead_letter);
    assert!(capabilities.can_listen);
    assert!(capabilities.can_clear);
}
