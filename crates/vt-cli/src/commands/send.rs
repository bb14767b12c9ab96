use vt_bridge::protocol::BridgeEnvelope;
use vt_core::config::Config;

use super::deliver_once;

/// Run the `send` subcommand.
pub async fn run(config: &Config, message: &str, silent: bool) -> anyhow::Result<()> {
    let message = message.trim();
    if message.is_empty() {
        anyhow::bail!("Nothing to send.");
    }
    let envelope = if silent {
        BridgeEnvelope::silent(message)
    } else {
        BridgeEnvelope::new(message)
    };
    deliver_once(config, envelope).await?;
    println!("Sent!");
    Ok(())
}
