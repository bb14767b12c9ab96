use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vt_core::config::Config;
use vt_core::settings::OverrideMode;
use vt_telemetry::metrics::{names, MetricsCollector};

use crate::classifier::{classify, classify_draft, Classification, DraftIntent, MarkerSet};
use crate::command_registry::{CommandInvocation, CommandOutput};
use crate::commands::{self, BridgeCommand};
use crate::host::{ChatHost, DraftChange, HostEvent, ListenerId, MessageDraft, Toast};
use crate::protocol::{BridgeEnvelope, WireFrame};
use crate::throttle::{IntervalGate, TypingThrottle};
use crate::transport::{ConnectionManager, ConnectionState, TransportError};

const CONNECTED_TOAST: &str = "Connected to OSC bridge";
const CLEARED_TOAST: &str = "Chatbox cleared!";
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("bridge endpoint {endpoint} is unavailable")]
    TransportUnavailable { endpoint: String },

    #[error("bridge socket at {endpoint} not ready after {timeout_ms}ms")]
    ReadinessTimeout { endpoint: String, timeout_ms: u64 },

    #[error("bridge controller has shut down")]
    ControllerGone,
}

// ---------------------------------------------------------------------------
// Settings and state
// ---------------------------------------------------------------------------

/// Resolved runtime settings for one controller.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub endpoint: String,
    pub ready_timeout: Duration,
    pub typing_interval: Duration,
    pub procedural_interval: Duration,
    pub procedural_min_len: usize,
    pub markers: MarkerSet,
}

impl BridgeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.bridge.endpoint.clone(),
            ready_timeout: Duration::from_millis(config.bridge.ready_timeout_ms),
            typing_interval: Duration::from_millis(config.bridge.typing_interval_ms),
            procedural_interval: Duration::from_millis(config.bridge.procedural_interval_ms),
            procedural_min_len: config.bridge.procedural_min_len,
            markers: MarkerSet::from(&config.markers),
        }
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "idle"),
            LifecycleState::Starting => write!(f, "starting"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Snapshot published on every lifecycle or mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStatus {
    pub lifecycle: LifecycleState,
    pub connection: ConnectionState,
    pub override_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownReason {
    Requested,
    Reconnect,
    SocketClosed,
    Shutdown,
}

impl TeardownReason {
    fn as_str(self) -> &'static str {
        match self {
            TeardownReason::Requested => "requested",
            TeardownReason::Reconnect => "reconnect",
            TeardownReason::SocketClosed => "socket_closed",
            TeardownReason::Shutdown => "shutdown",
        }
    }
}

/// Host-side registrations currently held. Each is released exactly once.
#[derive(Debug, Default)]
struct Registrations {
    commands: Vec<String>,
    pre_send: Option<ListenerId>,
    draft: Option<ListenerId>,
}

impl Registrations {
    fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.pre_send.is_none() && self.draft.is_none()
    }
}

// ---------------------------------------------------------------------------
// BridgeController
// ---------------------------------------------------------------------------

/// Drives the bridge lifecycle and reacts to host events.
///
/// All mutable state lives here and is touched only from the task running
/// [`BridgeController::run`], so there is no locking. The host talks to the
/// controller only through the inbox channel.
pub struct BridgeController {
    host: Arc<dyn ChatHost>,
    settings: BridgeSettings,
    override_mode: OverrideMode,
    metrics: Arc<MetricsCollector>,
    connection: ConnectionManager,
    throttle: TypingThrottle,
    procedural: IntervalGate,
    composing: bool,
    lifecycle: LifecycleState,
    registrations: Registrations,
    toolbox: Vec<String>,
    inbox_tx: flume::Sender<HostEvent>,
    inbox_rx: flume::Receiver<HostEvent>,
    status: watch::Sender<BridgeStatus>,
}

impl BridgeController {
    pub fn new(
        host: Arc<dyn ChatHost>,
        settings: BridgeSettings,
        override_mode: OverrideMode,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = flume::unbounded();
        let (status, _) = watch::channel(BridgeStatus {
            lifecycle: LifecycleState::Idle,
            connection: ConnectionState::Disconnected,
            override_mode: override_mode.get(),
        });
        let mut controller = Self {
            host,
            connection: ConnectionManager::new(Arc::clone(&metrics)),
            throttle: TypingThrottle::new(settings.typing_interval),
            procedural: IntervalGate::new(settings.procedural_interval),
            settings,
            override_mode,
            metrics,
            composing: false,
            lifecycle: LifecycleState::Idle,
            registrations: Registrations::default(),
            toolbox: Vec::new(),
            inbox_tx,
            inbox_rx,
            status,
        };
        controller.add_toolbox_actions();
        controller
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn override_mode(&self) -> bool {
        self.override_mode.get()
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BridgeStatus> {
        self.status.subscribe()
    }

    fn publish_status(&self) {
        self.status.send_replace(BridgeStatus {
            lifecycle: self.lifecycle,
            connection: self.connection.state(),
            override_mode: self.override_mode.get(),
        });
    }

    fn set_lifecycle(&mut self, next: LifecycleState) {
        if self.lifecycle != next {
            debug!(from = %self.lifecycle, to = %next, "bridge lifecycle");
            self.lifecycle = next;
        }
        self.publish_status();
    }

    // -- lifecycle ---------------------------------------------------------

    /// Register commands, open the socket and, once it is open, attach the
    /// message hooks. Ignored unless idle.
    ///
    /// When the socket does not open in time the commands stay registered so
    /// the user can `/connect` again, but no hooks are attached.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        if self.lifecycle != LifecycleState::Idle {
            debug!(state = %self.lifecycle, "start ignored");
            return Ok(());
        }
        self.set_lifecycle(LifecycleState::Starting);
        self.register_commands();

        let endpoint = self.settings.endpoint.clone();
        if self.connection.connect(&endpoint) == ConnectionState::Disconnected {
            self.set_lifecycle(LifecycleState::Idle);
            return Err(BridgeError::TransportUnavailable { endpoint });
        }

        if !self.connection.await_ready(self.settings.ready_timeout).await {
            self.connection.close();
            self.set_lifecycle(LifecycleState::Idle);
            let timeout_ms = self.settings.ready_timeout.as_millis() as u64;
            warn!(%endpoint, timeout_ms, "bridge not ready; message hooks not attached");
            return Err(BridgeError::ReadinessTimeout {
                endpoint,
                timeout_ms,
            });
        }

        self.host.show_toast(Toast::success(CONNECTED_TOAST));
        self.attach_listeners();
        self.composing = false;
        self.throttle.reset();
        self.procedural.reset();
        self.set_lifecycle(LifecycleState::Running);
        info!(%endpoint, override_mode = self.override_mode.get(), "bridge running");
        Ok(())
    }

    /// Release everything `start` acquired. Safe to call in any state.
    pub fn stop(&mut self) {
        self.teardown(TeardownReason::Requested);
    }

    /// Tear down, then start again.
    pub async fn restart(&mut self) -> Result<(), BridgeError> {
        self.teardown(TeardownReason::Reconnect);
        self.start().await
    }

    fn teardown(&mut self, reason: TeardownReason) {
        if self.lifecycle == LifecycleState::Stopping {
            return;
        }
        if self.lifecycle == LifecycleState::Idle && self.registrations.is_empty() {
            return;
        }
        self.set_lifecycle(LifecycleState::Stopping);

        self.detach_listeners();
        self.unregister_commands();
        self.connection.close();
        self.composing = false;
        self.throttle.reset();
        self.procedural.reset();

        self.metrics
            .increment_counter(names::TEARDOWNS, &[("reason", reason.as_str())]);
        self.set_lifecycle(LifecycleState::Idle);
        info!(reason = reason.as_str(), "bridge stopped");
    }

    fn register_commands(&mut self) {
        for descriptor in commands::descriptors() {
            if self.registrations.commands.contains(&descriptor.name) {
                continue;
            }
            let name = descriptor.name.clone();
            match self.host.register_command(descriptor, self.inbox_tx.clone()) {
                Ok(()) => self.registrations.commands.push(name),
                Err(e) => warn!(error = %e, "command registration skipped"),
            }
        }
    }

    fn add_toolbox_actions(&mut self) {
        for descriptor in commands::toolbox_actions() {
            let name = descriptor.name.clone();
            match self.host.add_toolbox_action(descriptor, self.inbox_tx.clone()) {
                Ok(()) => self.toolbox.push(name),
                Err(e) => warn!(error = %e, "toolbox action skipped"),
            }
        }
    }

    fn remove_toolbox_actions(&mut self) {
        for name in self.toolbox.drain(..) {
            self.host.remove_toolbox_action(&name);
        }
    }

    fn unregister_commands(&mut self) {
        for name in self.registrations.commands.drain(..) {
            self.host.unregister_command(&name);
        }
    }

    fn attach_listeners(&mut self) {
        if self.registrations.pre_send.is_none() {
            self.registrations.pre_send =
                Some(self.host.add_pre_send_listener(self.inbox_tx.clone()));
        }
        if self.registrations.draft.is_none() {
            self.registrations.draft = Some(self.host.add_draft_listener(self.inbox_tx.clone()));
        }
    }

    fn detach_listeners(&mut self) {
        if let Some(id) = self.registrations.pre_send.take() {
            self.host.remove_pre_send_listener(id);
        }
        if let Some(id) = self.registrations.draft.take() {
            self.host.remove_draft_listener(id);
        }
    }

    // -- sending -----------------------------------------------------------

    /// Write one frame if running. A closed socket tears the bridge down.
    fn send_frame(&mut self, frame: WireFrame) -> bool {
        if self.lifecycle != LifecycleState::Running {
            return false;
        }
        match self.connection.send(&frame) {
            Ok(()) => true,
            Err(TransportError::ConnectionClosed) => {
                warn!(kind = frame.kind(), "bridge socket closed; tearing down");
                self.teardown(TeardownReason::SocketClosed);
                false
            }
            Err(_) => false,
        }
    }

    /// Send an envelope followed by `typing:false`.
    fn deliver(&mut self, envelope: BridgeEnvelope) -> bool {
        let clears = envelope.is_clear();
        if !self.send_frame(WireFrame::Envelope(envelope)) {
            return false;
        }
        self.stop_typing();
        if clears {
            self.host.show_toast(Toast::success(CLEARED_TOAST));
        }
        true
    }

    fn stop_typing(&mut self) {
        if let Some(frame) = self.throttle.request(false) {
            self.send_frame(frame);
        }
        self.composing = false;
        self.procedural.reset();
    }

    // -- host hooks --------------------------------------------------------

    /// Decide what the host should actually send for `draft`.
    pub fn on_pre_send(&mut self, mut draft: MessageDraft) -> MessageDraft {
        if self.lifecycle != LifecycleState::Running {
            return draft;
        }
        if self.connection.state() == ConnectionState::Closed {
            warn!("bridge socket closed before send; tearing down");
            self.teardown(TeardownReason::SocketClosed);
            return draft;
        }

        let decision = classify(&draft.content, self.override_mode.get(), &self.settings.markers);
        self.metrics
            .increment_counter(names::CLASSIFICATIONS, &[("decision", decision.label())]);
        debug!(decision = decision.label(), channel = %draft.channel_id, "classified message");

        match decision {
            Classification::PassThroughToChat { rewrite } => {
                if let Some(text) = rewrite {
                    draft.content = text;
                }
            }
            Classification::SendToBridge(envelope) => {
                self.deliver(envelope);
            }
            Classification::SendToBridgeAndClearChat(envelope) => {
                // Undelivered text stays in the draft so it is not lost.
                if self.deliver(envelope) {
                    draft.content.clear();
                }
            }
            Classification::Suppressed => draft.content.clear(),
        }
        draft
    }

    /// React to the user editing the text box.
    pub fn on_draft_changed(&mut self, change: &DraftChange) {
        if self.lifecycle != LifecycleState::Running {
            return;
        }
        let intent = classify_draft(
            &change.draft,
            self.override_mode.get(),
            &self.settings.markers,
            self.settings.procedural_min_len,
        );
        match intent {
            DraftIntent::Composing { live } => {
                let now = Instant::now();
                self.composing = true;
                if let Some(frame) = self.throttle.request_at(true, now) {
                    self.send_frame(frame);
                }
                if self.procedural.try_pass_at(now) {
                    self.send_frame(WireFrame::Envelope(BridgeEnvelope::procedural(live)));
                }
            }
            DraftIntent::Idle => {
                if self.composing {
                    self.stop_typing();
                }
            }
        }
    }

    pub async fn on_command(&mut self, invocation: CommandInvocation) {
        let output = match BridgeCommand::parse(&invocation.name, &invocation.ctx) {
            Ok(command) => {
                debug!(command = %invocation.name, source = %invocation.ctx.source, "running command");
                self.execute(command).await
            }
            Err(e) => CommandOutput::err(e.to_string()),
        };
        let _ = invocation.reply.send(output);
    }

    async fn execute(&mut self, command: BridgeCommand) -> CommandOutput {
        match command {
            BridgeCommand::Connect => match self.restart().await {
                Ok(()) => CommandOutput::ok(format!(
                    "Connected to bridge at {}",
                    self.settings.endpoint
                )),
                Err(e) => CommandOutput::err(e.to_string()),
            },
            BridgeCommand::Override(enabled) => {
                self.override_mode.set(enabled);
                self.publish_status();
                info!(enabled, "override mode changed");
                CommandOutput::ok(format!("Override mode is now {enabled}."))
            }
            BridgeCommand::Clear => {
                if self.deliver(BridgeEnvelope::clear()) {
                    CommandOutput::ok(CLEARED_TOAST)
                } else {
                    CommandOutput::err("Bridge is not connected.")
                }
            }
            BridgeCommand::Say(msg) => {
                if self.deliver(BridgeEnvelope::new(msg)) {
                    CommandOutput::ok("Sent!")
                } else {
                    CommandOutput::err("Bridge is not connected.")
                }
            }
        }
    }

    pub async fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::PreSend(request) => {
                let draft = self.on_pre_send(request.draft);
                let _ = request.reply.send(draft);
            }
            HostEvent::DraftChanged(change) => self.on_draft_changed(&change),
            HostEvent::Command(invocation) => self.on_command(invocation).await,
        }
    }

    // -- actor -------------------------------------------------------------

    /// Serve control requests and host events until shut down.
    pub async fn run(mut self, control: flume::Receiver<ControlRequest>) {
        let inbox = self.inbox_rx.clone();
        loop {
            tokio::select! {
                request = control.recv_async() => match request {
                    Ok(ControlRequest::Start) => {
                        if let Err(e) = self.start().await {
                            warn!(error = %e, "bridge start failed");
                        }
                    }
                    Ok(ControlRequest::Stop) => self.stop(),
                    Ok(ControlRequest::Shutdown) | Err(_) => break,
                },
                event = inbox.recv_async() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(_) => break,
                },
            }
        }

        self.teardown(TeardownReason::Shutdown);
        self.remove_toolbox_actions();
        self.connection.close_gracefully(DRAIN_TIMEOUT).await;
        info!("bridge controller exited");
    }

    /// Move the controller onto its own task.
    pub fn spawn(self) -> BridgeHandle {
        let (control, rx) = flume::unbounded();
        let status = self.subscribe_status();
        let task = tokio::spawn(self.run(rx));
        BridgeHandle {
            control,
            status,
            task,
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeHandle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Start,
    Stop,
    Shutdown,
}

/// Control surface for a spawned [`BridgeController`].
pub struct BridgeHandle {
    control: flume::Sender<ControlRequest>,
    status: watch::Receiver<BridgeStatus>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn start(&self) -> Result<(), BridgeError> {
        self.control
            .send(ControlRequest::Start)
            .map_err(|_| BridgeError::ControllerGone)
    }

    pub fn stop(&self) -> Result<(), BridgeError> {
        self.control
            .send(ControlRequest::Stop)
            .map_err(|_| BridgeError::ControllerGone)
    }

    pub fn status(&self) -> BridgeStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BridgeStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `pred`, at most `timeout`.
    pub async fn wait_for(
        &mut self,
        timeout: Duration,
        mut pred: impl FnMut(&BridgeStatus) -> bool,
    ) -> bool {
        let waited = tokio::time::timeout(timeout, self.status.wait_for(|s| pred(s))).await;
        matches!(waited, Ok(Ok(_)))
    }

    /// Stop, wait for the controller to go idle, then start again and wait
    /// for it to be running. Each wait is bounded by `timeout`. Returns
    /// whether the bridge came back up.
    pub async fn restart(&mut self, timeout: Duration) -> Result<bool, BridgeError> {
        self.stop()?;
        if !self
            .wait_for(timeout, |s| s.lifecycle == LifecycleState::Idle)
            .await
        {
            return Ok(false);
        }
        self.start()?;
        Ok(self
            .wait_for(timeout, |s| s.lifecycle == LifecycleState::Running)
            .await)
    }

    /// Stop the controller and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.control.send(ControlRequest::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "bridge controller task failed");
        }
    }
}
