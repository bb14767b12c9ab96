pub mod clear;
pub mod config;
pub mod run;
pub mod send;

use std::sync::Arc;
use std::time::Duration;

use vt_bridge::protocol::{BridgeEnvelope, WireFrame};
use vt_bridge::transport::ConnectionManager;
use vt_core::config::Config;
use vt_telemetry::metrics::MetricsCollector;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Open a one-off connection, write `envelope` and the trailing
/// `typing:false`, then close once both are flushed.
pub async fn deliver_once(config: &Config, envelope: BridgeEnvelope) -> anyhow::Result<()> {
    let mut conn = ConnectionManager::new(Arc::new(MetricsCollector::new()));
    conn.connect(&config.bridge.endpoint);
    let timeout = Duration::from_millis(config.bridge.ready_timeout_ms);
    if !conn.await_ready(timeout).await {
        conn.close();
        anyhow::bail!(
            "Could not reach the bridge at {}. Is it running?\n  \
             (hint: check the endpoint with `vt config` or pass --endpoint)",
            config.bridge.endpoint
        );
    }

    conn.send(&WireFrame::Envelope(envelope))?;
    conn.send(&WireFrame::heartbeat(false))?;
    conn.close_gracefully(FLUSH_TIMEOUT).await;
    Ok(())
}
