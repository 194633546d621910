use gw_telemetry::{connector_directive, metrics, new_request_id, record_decode_failure};
use tracing_subscriber::filter::Directive;

#[test]
fn request_ids_are_unique() {
    let a = new_request_id();
    let b = new_request_id();
    assert!(!a.is_empty());
    assert_ne!(a, b);
}

#[test]
fn connector_directive_targets_span_field() {
    let directive = connector_directive("dev1", "debug");
    assert_eq!(directive, "[connector{id=dev1}]=debug");
    assert!(directive.parse::<Directive>().is_ok());
}

#[test]
fn counters_are_monotonic() {
    let before = metrics().snapshot().decode_failures;
    record_decode_failure();
    assert!(metrics().snapshot().decode_failures > before);
}

#[test]
fn init_is_idempotent() {
    gw_telemetry::init_tracing_with(&["not a directive [".to_string()]);
    gw_telemetry::init_tracing();
}
