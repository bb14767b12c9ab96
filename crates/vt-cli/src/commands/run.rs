use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use vt_bridge::command_registry::CommandSource;
use vt_bridge::controller::{BridgeController, BridgeHandle, BridgeSettings, LifecycleState};
use vt_bridge::host::{LocalHost, MessageDraft};
use vt_core::config::Config;
use vt_core::settings::{OverrideMode, SettingsManager};
use vt_telemetry::metrics::MetricsCollector;

const CHANNEL: &str = "console";

/// One line of console input.
#[derive(Debug, PartialEq, Eq)]
enum ConsoleInput<'a> {
    Quit,
    Restart,
    Status,
    Toolbox(&'a str),
    Command(&'a str),
    Message(&'a str),
    Blank,
}

impl<'a> ConsoleInput<'a> {
    fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "" => ConsoleInput::Blank,
            ":quit" | ":q" => ConsoleInput::Quit,
            ":restart" => ConsoleInput::Restart,
            ":status" => ConsoleInput::Status,
            ":connect" => ConsoleInput::Toolbox("connect"),
            ":clear" => ConsoleInput::Toolbox("clear"),
            cmd if cmd.starts_with('/') => ConsoleInput::Command(cmd),
            _ => ConsoleInput::Message(line),
        }
    }
}

/// Run the interactive console host until `:quit`, ctrl-c or end of input.
pub async fn run(
    config: Config,
    settings: SettingsManager,
    override_mode: bool,
    print_metrics: bool,
) -> anyhow::Result<()> {
    let host = LocalHost::new();
    let metrics = Arc::new(MetricsCollector::new());
    let mode = OverrideMode::from_config(&config);
    if override_mode {
        mode.set(true);
    }

    let bridge_settings = BridgeSettings::from_config(&config);
    let ready_wait = bridge_settings.ready_timeout + Duration::from_millis(500);
    let mut handle = BridgeController::new(
        Arc::new(host.clone()),
        bridge_settings,
        mode.clone(),
        Arc::clone(&metrics),
    )
    .spawn();

    let toasts = host.subscribe_toasts();
    tokio::spawn(async move {
        while let Ok(toast) = toasts.recv_async().await {
            println!("[toast] {}", toast.message);
        }
    });

    start_and_report(&mut handle, ready_wait, &config.bridge.endpoint).await?;
    println!("Type to chat. Prefix with == to send to the chatbox, /help for commands, :quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match ConsoleInput::parse(&line) {
            ConsoleInput::Blank => {}
            ConsoleInput::Quit => break,
            ConsoleInput::Restart => {
                if !handle.restart(ready_wait).await? {
                    report_unreachable(&config.bridge.endpoint);
                }
            }
            ConsoleInput::Status => {
                println!("{}", serde_json::to_string(&handle.status())?);
            }
            ConsoleInput::Toolbox(action) => match host.invoke_toolbox(action).await {
                Ok(out) if out.success => println!("{}", out.message),
                Ok(out) => println!("error: {}", out.message),
                Err(e) => println!("error: {e}"),
            },
            ConsoleInput::Command("/help") => print_help(&host),
            ConsoleInput::Command(cmd) => {
                match host.invoke_line(cmd, CommandSource::SlashCommand).await {
                    Ok(out) if out.success => println!("{}", out.message),
                    Ok(out) => println!("error: {}", out.message),
                    Err(e) => println!("error: {e}"),
                }
            }
            ConsoleInput::Message(text) => {
                type_out(&host, text);
                let sent = host.submit(MessageDraft::new(CHANNEL, text)).await;
                host.draft_changed(CHANNEL, "");
                if !sent.content.is_empty() {
                    println!("[chat] {}", sent.content);
                }
            }
        }
    }

    handle.shutdown().await;
    persist_override(&settings, mode.get());

    if print_metrics {
        print!("{}", metrics.export_prometheus());
    }
    Ok(())
}

async fn start_and_report(
    handle: &mut BridgeHandle,
    wait: Duration,
    endpoint: &str,
) -> anyhow::Result<()> {
    handle.start()?;
    let running = handle
        .wait_for(wait, |s| s.lifecycle == LifecycleState::Running)
        .await;
    if !running {
        report_unreachable(endpoint);
    }
    Ok(())
}

fn report_unreachable(endpoint: &str) {
    println!("Bridge at {endpoint} is not reachable; use :connect to retry.");
}

/// Feed the line to draft listeners one character at a time, as a user
/// typing it would.
fn type_out(host: &LocalHost, text: &str) {
    for (idx, ch) in text.char_indices() {
        host.draft_changed(CHANNEL, &text[..idx + ch.len_utf8()]);
    }
}

fn print_help(host: &LocalHost) {
    let commands = host.registered_commands();
    if commands.is_empty() {
        println!("No commands registered.");
    }
    for cmd in commands {
        let args: Vec<String> = cmd.options.iter().map(|o| format!("<{}>", o.name)).collect();
        println!("/{} {} -- {}", cmd.name, args.join(" "), cmd.description);
    }
    for action in host.toolbox_actions() {
        println!(":{} -- {}", action.name, action.description);
    }
    println!(":restart -- restart the bridge");
    println!(":status -- show bridge status");
    println!(":quit -- exit");
}

fn persist_override(settings: &SettingsManager, enabled: bool) {
    let mut on_disk = settings.load_or_default();
    if on_disk.bridge.override_mode == enabled {
        return;
    }
    on_disk.bridge.override_mode = enabled;
    match settings.save(&on_disk) {
        Ok(()) => tracing::debug!(enabled, "override mode saved"),
        Err(e) => tracing::warn!(error = %e, "failed to save override mode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_console_input() {
        assert_eq!(ConsoleInput::parse(":quit"), ConsoleInput::Quit);
        assert_eq!(ConsoleInput::parse("  :restart "), ConsoleInput::Restart);
        assert_eq!(
            ConsoleInput::parse("/override true"),
            ConsoleInput::Command("/override true")
        );
        assert_eq!(ConsoleInput::parse("==hi "), ConsoleInput::Message("==hi "));
        assert_eq!(ConsoleInput::parse("   "), ConsoleInput::Blank);
        assert_eq!(ConsoleInput::parse(":connect"), ConsoleInput::Toolbox("connect"));
        assert_eq!(ConsoleInput::parse(" :clear"), ConsoleInput::Toolbox("clear"));
    }

    #[test]
    fn type_out_emits_every_prefix() {
        let host = LocalHost::new();
        let (tx, rx) = flume::unbounded();
        vt_bridge::host::ChatHost::add_draft_listener(&host, tx);
        type_out(&host, "h\u{e9}y");
        let drafts: Vec<String> = rx
            .drain()
            .filter_map(|e| match e {
                vt_bridge::host::HostEvent::DraftChanged(c) => Some(c.draft),
                _ => None,
            })
            .collect();
        assert_eq!(drafts, vec!["h", "h\u{e9}", "h\u{e9}y"]);
    }
}
