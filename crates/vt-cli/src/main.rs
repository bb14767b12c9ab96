mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vt_core::config::LogFormat;
use vt_core::settings::SettingsManager;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// vrc-text-bridge CLI -- route chat messages to a local chatbox bridge.
#[derive(Parser)]
#[command(name = "vt", version, about)]
struct Cli {
    /// Config file to use instead of ~/.vrc-text-bridge/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bridge websocket endpoint, overriding the config file.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive console chat host with the bridge attached
    /// (default when no subcommand is given).
    Run {
        /// Start with override mode on.
        #[arg(long = "override")]
        override_mode: bool,
        /// Print a Prometheus metrics snapshot on exit.
        #[arg(long)]
        metrics: bool,
    },

    /// Send one message straight to the bridge.
    Send {
        /// Message text.
        message: String,
        /// Suppress the notification sound.
        #[arg(short, long)]
        silent: bool,
    },

    /// Clear the remote chatbox.
    Clear,

    /// Print the effective configuration.
    Config {
        /// Print as JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = cli
        .config
        .clone()
        .map(SettingsManager::new)
        .unwrap_or_else(SettingsManager::default_path);

    let command = cli.command.unwrap_or(Commands::Run {
        override_mode: false,
        metrics: false,
    });
    if let Commands::Init { force } = command {
        vt_telemetry::logging::init_logging("vt", "info");
        return commands::config::init(&settings, force);
    }

    let mut config = if cli.config.is_some() {
        settings.load()?
    } else {
        settings.load_or_default()
    };
    if let Some(endpoint) = cli.endpoint {
        config.bridge.endpoint = endpoint;
        config.validate()?;
    }
    if cli.json_logs {
        config.general.log_format = LogFormat::Json;
    }
    vt_telemetry::logging::init_from_config("vt", &config.general);

    match command {
        Commands::Run {
            override_mode,
            metrics,
        } => commands::run::run(config, settings, override_mode, metrics).await?,
        Commands::Send { message, silent } => commands::send::run(&config, &message, silent).await?,
        Commands::Clear => commands::clear::run(&config).await?,
        Commands::Config { json } => commands::config::show(&config, json)?,
        // Written above, before any config is loaded.
        Commands::Init { .. } => {}
    }

    Ok(())
}
