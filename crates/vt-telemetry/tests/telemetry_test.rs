use vt_core::config::{GeneralConfig, LogFormat};
use vt_telemetry::logging;
use vt_telemetry::metrics::{names, MetricsCollector};

#[test]
fn test_init_logging_human() {
    // Should not panic; second call is a safe no-op.
    logging::init_logging("test-service", "debug");
    logging::init_logging("test-service", "info");

    tracing::info!(key = "value", "human-readable log line");
}

#[test]
fn test_init_logging_json() {
    // The global subscriber may already be set by another test; this must
    // silently no-op in that case.
    logging::init_logging_json("test-service-json", "info");

    tracing::info!(key = "value", "json log line");
}

#[test]
fn test_init_from_config() {
    let general = GeneralConfig {
        log_level: "warn".into(),
        log_format: LogFormat::Json,
    };
    logging::init_from_config("config-test", &general);
}

#[test]
fn test_prometheus_export() {
    let m = MetricsCollector::new();
    m.increment_counter(names::TEARDOWNS, &[("reason", "send_on_closed")]);
    m.set_gauge(names::CONNECTION_STATE, 2);

    let output = m.export_prometheus();
    assert!(output.contains("# TYPE vt_teardowns_total counter"));
    assert!(output.contains("vt_teardowns_total{reason=\"send_on_closed\"} 1"));
    assert!(output.contains("# TYPE vt_connection_state gauge"));
    assert!(output.contains("vt_connection_state 2"));
}

#[test]
fn test_json_export() {
    let m = MetricsCollector::new();
    m.increment_counter_by(names::FRAMES_SENT, &[("kind", "heartbeat")], 4);
    m.set_gauge(names::CONNECTION_STATE, 1);

    let json = m.export_json();
    assert_eq!(json["gauges"]["vt_connection_state"], 1);
    assert_eq!(json["counters"]["vt_frames_sent_total{kind=\"heartbeat\"}"], 4);
}
