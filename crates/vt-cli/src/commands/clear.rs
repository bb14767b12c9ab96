use vt_bridge::protocol::BridgeEnvelope;
use vt_core::config::Config;

use super::deliver_once;

/// Run the `clear` subcommand.
pub async fn run(config: &Config) -> anyhow::Result<()> {
    deliver_once(config, BridgeEnvelope::clear()).await?;
    println!("Chatbox cleared!");
    Ok(())
}
