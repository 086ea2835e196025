use super::{GatewayError, logging};

#[test]
fn test_logging_init_accepts_levels() {
    logging::init("info");
    logging::init("debug");
    logging::init("warning");
    logging::init("nonsense");
}

#[test]
fn test_error_kinds_are_stable() {
    assert_eq!(GatewayError::Connect("x".into()).kind(), "connect");
    assert_eq!(
        GatewayError::UnknownRoutingTarget("k".into()).kind(),
        "unknown_routing_target"
    );
    assert_eq!(GatewayError::Publish("nack".into()).kind(), "publish");
}

#[test]
fn test_error_display_names_the_failure() {
    let err = GatewayError::Subscribe("queue declare refused".into());
    assert_eq!(err.to_string(), "subscribe failed: queue declare refused");
}

#[test]
fn test_teardown_error_is_named() {
    let err = GatewayError::Teardown("unbind orders.q: channel closed".into());
    assert_eq!(err.kind(), "teardown");
    assert_eq!(
        err.to_string(),
        "teardown failed: unbind orders.q: channel closed"
    );
}
