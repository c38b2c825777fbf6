//! Tests for connection parameter resolution.

use super::*;

fn credentials() -> CredentialParams {
    CredentialParams::new()
        .with_access_id("AKIATEST")
        .with_access_key("secret")
}

#[test]
fn test_resolve_applies_defaults() {
    let connection = ConnectionParams::new().with_region("eu-west-1");
    let descriptor =
        ConnectionDescriptor::resolve("orders", &connection, &credentials(), None).unwrap();

    assert_eq!(descriptor.region, "eu-west-1");
    assert_eq!(descriptor.endpoint, "https://sqs.eu-west-1.amazonaws.com");
    assert_eq!(descriptor.queue_name, "orders");
    assert_eq!(descriptor.dead_queue_name, None);
    assert_eq!(
        descriptor.poll_interval,
        std::time::Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
    );
    assert_eq!(
        descriptor.visibility_timeout,
        Duration::seconds(DEFAULT_VISIBILITY_TIMEOUT_SECS)
    );
}

#[test]
fn test_resource_overrides_queue_and_logical_name() {
    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_queue("named-queue")
        .with_resource("explicit-resource");
    let descriptor =
        ConnectionDescriptor::resolve("orders", &connection, &credentials(), None).unwrap();
    assert_eq!(descriptor.queue_name, "explicit-resource");

    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_queue("named-queue");
    let descriptor =
        ConnectionDescriptor::resolve("orders", &connection, &credentials(), None).unwrap();
    assert_eq!(descriptor.queue_name, "named-queue");
}

#[test]
fn test_endpoint_override_trims_trailing_slash() {
    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_endpoint("http://localhost:4566/");
    let descriptor =
        ConnectionDescriptor::resolve("orders", &connection, &credentials(), None).unwrap();
    assert_eq!(descriptor.endpoint, "http://localhost:4566");
}

#[test]
fn test_invalid_endpoint_is_a_configuration_error() {
    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_endpoint("not a url");
    let err = ConnectionDescriptor::resolve("orders", &connection, &credentials(), Some("corr-3"))
        .unwrap_err();
    match err {
        MessagingError::Configuration { correlation_id, .. } => {
            assert_eq!(correlation_id.as_deref(), Some("corr-3"));
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn test_missing_required_fields() {
    let err = ConnectionDescriptor::resolve(
        "orders",
        &ConnectionParams::new(),
        &credentials(),
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("region"));

    let connection = ConnectionParams::new().with_region("eu-west-1");
    let err = ConnectionDescriptor::resolve("orders", &connection, &CredentialParams::new(), None)
        .unwrap_err();
    assert!(err.to_string().contains("access_id"));

    let half = CredentialParams::new().with_access_id("AKIATEST");
    let err = ConnectionDescriptor::resolve("orders", &connection, &half, None).unwrap_err();
    assert!(err.to_string().contains("access_key"));
}

#[test]
fn test_empty_strings_are_treated_as_missing() {
    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_resource("")
        .with_queue("")
        .with_dead_queue("");
    let descriptor =
        ConnectionDescriptor::resolve("orders", &connection, &credentials(), None).unwrap();
    assert_eq!(descriptor.queue_name, "orders");
    assert_eq!(descriptor.dead_queue_name, None);
}

#[test]
fn test_params_round_trip_through_json() {
    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_queue("orders")
        .with_interval_ms(250);
    let json = serde_json::to_string(&connection).unwrap();
    let restored: ConnectionParams = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.region.as_deref(), Some("eu-west-1"));
    assert_eq!(restored.queue.as_deref(), Some("orders"));
    assert_eq!(restored.interval_ms, Some(250));
}

#[test]
fn test_negative_visibility_is_clamped() {
    let connection = ConnectionParams::new()
        .with_region("eu-west-1")
        .with_visibility_timeout_secs(-5);
    let descriptor =
        ConnectionDescriptor::resolve("orders", &connection, &credentials(), None).unwrap();
    assert_eq!(descriptor.visibility_timeout, Duration::zero());
}
