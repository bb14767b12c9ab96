//! The chat client the bridge plugs into.
//!
//! [`ChatHost`] is the narrow surface the controller needs: command
//! registration, toolbox actions, the pre-send hook, draft-change
//! notifications and toasts.
//! Hooks are delivered as [`HostEvent`]s on a flume channel the controller
//! owns, so the host never calls back into controller state directly.
//! [`LocalHost`] is an in-process implementation used by the CLI and tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::command_registry::{
    CommandContext, CommandDescriptor, CommandError, CommandInvocation, CommandOutput,
    CommandSource,
};

const MAX_TOAST_HISTORY: usize = 100;
const MAX_SENT_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outgoing chat message the host is about to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub channel_id: String,
    pub content: String,
}

impl MessageDraft {
    pub fn new(channel_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftChange {
    pub channel_id: String,
    pub draft: String,
}

/// A pre-send hook call. The listener replies with the (possibly rewritten)
/// draft; an empty reply means the host sends nothing.
#[derive(Debug)]
pub struct PreSendRequest {
    pub draft: MessageDraft,
    pub reply: oneshot::Sender<MessageDraft>,
}

#[derive(Debug)]
pub enum HostEvent {
    PreSend(PreSendRequest),
    DraftChanged(DraftChange),
    Command(CommandInvocation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Message,
    Success,
    Failure,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: Uuid,
    pub kind: ToastKind,
    pub message: String,
    pub duration: Duration,
    pub issued_at: DateTime<Utc>,
}

impl Toast {
    pub fn new(kind: ToastKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            duration: Duration::from_secs(5),
            issued_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastKind::Success, message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("command already registered: /{0}")]
    DuplicateCommand(String),

    #[error("toolbox action already registered: {0}")]
    DuplicateAction(String),
}

/// What the bridge needs from a chat client.
pub trait ChatHost: Send + Sync + 'static {
    /// Register a command; invocations arrive on `inbox`.
    fn register_command(
        &self,
        descriptor: CommandDescriptor,
        inbox: flume::Sender<HostEvent>,
    ) -> Result<(), HostError>;

    fn unregister_command(&self, name: &str) -> bool;

    /// Add an entry to the host's toolbox menu. Toolbox actions are not
    /// slash commands and live independently of them.
    fn add_toolbox_action(
        &self,
        descriptor: CommandDescriptor,
        inbox: flume::Sender<HostEvent>,
    ) -> Result<(), HostError>;

    fn remove_toolbox_action(&self, name: &str) -> bool;

    fn add_pre_send_listener(&self, inbox: flume::Sender<HostEvent>) -> ListenerId;

    fn remove_pre_send_listener(&self, id: ListenerId) -> bool;

    fn add_draft_listener(&self, inbox: flume::Sender<HostEvent>) -> ListenerId;

    fn remove_draft_listener(&self, id: ListenerId) -> bool;

    fn show_toast(&self, toast: Toast);
}

// ---------------------------------------------------------------------------
// LocalHost
// ---------------------------------------------------------------------------

/// Counts of registry mutations over the host's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrationStats {
    pub commands_registered: usize,
    pub commands_unregistered: usize,
    pub listeners_added: usize,
    pub listeners_removed: usize,
    pub actions_added: usize,
    pub actions_removed: usize,
}

struct RegisteredCommand {
    descriptor: CommandDescriptor,
    inbox: flume::Sender<HostEvent>,
}

#[derive(Default)]
struct HostState {
    commands: AHashMap<String, RegisteredCommand>,
    toolbox: AHashMap<String, RegisteredCommand>,
    pre_send: Vec<(ListenerId, flume::Sender<HostEvent>)>,
    draft: Vec<(ListenerId, flume::Sender<HostEvent>)>,
    toasts: Vec<Toast>,
    toast_subscribers: Vec<flume::Sender<Toast>>,
    sent: Vec<MessageDraft>,
    stats: RegistrationStats,
}

/// In-process chat host. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct LocalHost {
    inner: Arc<Mutex<HostState>>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `draft` through every pre-send listener in registration order and
    /// return what the host would send. Empty content means nothing is sent.
    pub async fn submit(&self, draft: MessageDraft) -> MessageDraft {
        let listeners: Vec<flume::Sender<HostEvent>> = self
            .state()
            .pre_send
            .iter()
            .map(|(_, tx)| tx.clone())
            .collect();

        let mut current = draft;
        for listener in listeners {
            let (reply, rx) = oneshot::channel();
            let request = PreSendRequest {
                draft: current.clone(),
                reply,
            };
            if listener.send(HostEvent::PreSend(request)).is_err() {
                continue;
            }
            // A listener that drops the request leaves the draft untouched.
            if let Ok(rewritten) = rx.await {
                current = rewritten;
            }
        }

        if !current.content.is_empty() {
            let mut state = self.state();
            state.sent.push(current.clone());
            while state.sent.len() > MAX_SENT_HISTORY {
                state.sent.remove(0);
            }
        }
        current
    }

    /// Notify draft listeners that the text box changed.
    pub fn draft_changed(&self, channel_id: &str, draft: &str) {
        let mut state = self.state();
        state.draft.retain(|(_, tx)| {
            tx.send(HostEvent::DraftChanged(DraftChange {
                channel_id: channel_id.to_string(),
                draft: draft.to_string(),
            }))
            .is_ok()
        });
    }

    /// Invoke a registered command and wait for its reply.
    pub async fn invoke(&self, name: &str, ctx: CommandContext) -> Result<CommandOutput, CommandError> {
        let inbox = {
            let state = self.state();
            let cmd = state
                .commands
                .get(name)
                .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
            cmd.descriptor.check(&ctx)?;
            cmd.inbox.clone()
        };
        dispatch(inbox, name, ctx).await
    }

    /// Click a toolbox action.
    pub async fn invoke_toolbox(&self, name: &str) -> Result<CommandOutput, CommandError> {
        let inbox = self
            .state()
            .toolbox
            .get(name)
            .map(|action| action.inbox.clone())
            .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
        dispatch(inbox, name, CommandContext::new(CommandSource::Toolbox)).await
    }

    /// Parse and invoke a line such as `/override true`.
    pub async fn invoke_line(
        &self,
        line: &str,
        source: CommandSource,
    ) -> Result<CommandOutput, CommandError> {
        let line = line.trim();
        let body = line.strip_prefix('/').unwrap_or(line);
        let (name, args) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
        let ctx = {
            let state = self.state();
            let cmd = state
                .commands
                .get(name)
                .ok_or_else(|| CommandError::NotFound(name.to_string()))?;
            cmd.descriptor.parse_args(source, args)?
        };
        self.invoke(name, ctx).await
    }

    pub fn subscribe_toasts(&self) -> flume::Receiver<Toast> {
        let (tx, rx) = flume::unbounded();
        self.state().toast_subscribers.push(tx);
        rx
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.state().toasts.clone()
    }

    /// Messages that made it past the pre-send hooks.
    pub fn sent_messages(&self) -> Vec<MessageDraft> {
        self.state().sent.clone()
    }

    pub fn registered_commands(&self) -> Vec<CommandDescriptor> {
        let mut commands: Vec<CommandDescriptor> = self
            .state()
            .commands
            .values()
            .map(|c| c.descriptor.clone())
            .collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));
        commands
    }

    pub fn toolbox_actions(&self) -> Vec<CommandDescriptor> {
        let mut actions: Vec<CommandDescriptor> = self
            .state()
            .toolbox
            .values()
            .map(|a| a.descriptor.clone())
            .collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        actions
    }

    pub fn pre_send_listener_count(&self) -> usize {
        self.state().pre_send.len()
    }

    pub fn draft_listener_count(&self) -> usize {
        self.state().draft.len()
    }

    pub fn stats(&self) -> RegistrationStats {
        self.state().stats
    }
}

async fn dispatch(
    inbox: flume::Sender<HostEvent>,
    name: &str,
    ctx: CommandContext,
) -> Result<CommandOutput, CommandError> {
    let (reply, rx) = oneshot::channel();
    inbox
        .send(HostEvent::Command(CommandInvocation {
            name: name.to_string(),
            ctx,
            reply,
        }))
        .map_err(|_| CommandError::Unavailable(name.to_string()))?;
    rx.await
        .map_err(|_| CommandError::Unavailable(name.to_string()))
}

impl ChatHost for LocalHost {
    fn register_command(
        &self,
        descriptor: CommandDescriptor,
        inbox: flume::Sender<HostEvent>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if state.commands.contains_key(&descriptor.name) {
            return Err(HostError::DuplicateCommand(descriptor.name));
        }
        state.stats.commands_registered += 1;
        state
            .commands
            .insert(descriptor.name.clone(), RegisteredCommand { descriptor, inbox });
        Ok(())
    }

    fn unregister_command(&self, name: &str) -> bool {
        let mut state = self.state();
        let removed = state.commands.remove(name).is_some();
        if removed {
            state.stats.commands_unregistered += 1;
        }
        removed
    }

    fn add_toolbox_action(
        &self,
        descriptor: CommandDescriptor,
        inbox: flume::Sender<HostEvent>,
    ) -> Result<(), HostError> {
        let mut state = self.state();
        if state.toolbox.contains_key(&descriptor.name) {
            return Err(HostError::DuplicateAction(descriptor.name));
        }
        state.stats.actions_added += 1;
        state
            .toolbox
            .insert(descriptor.name.clone(), RegisteredCommand { descriptor, inbox });
        Ok(())
    }

    fn remove_toolbox_action(&self, name: &str) -> bool {
        let mut state = self.state();
        let removed = state.toolbox.remove(name).is_some();
        if removed {
            state.stats.actions_removed += 1;
        }
        removed
    }

    fn add_pre_send_listener(&self, inbox: flume::Sender<HostEvent>) -> ListenerId {
        let id = ListenerId::new();
        let mut state = self.state();
        state.pre_send.push((id, inbox));
        state.stats.listeners_added += 1;
        id
    }

    fn remove_pre_send_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.pre_send.len();
        state.pre_send.retain(|(lid, _)| *lid != id);
        let removed = state.pre_send.len() != before;
        if removed {
            state.stats.listeners_removed += 1;
        }
        removed
    }

    fn add_draft_listener(&self, inbox: flume::Sender<HostEvent>) -> ListenerId {
        let id = ListenerId::new();
        let mut state = self.state();
        state.draft.push((id, inbox));
        state.stats.listeners_added += 1;
        id
    }

    fn remove_draft_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state();
        let before = state.draft.len();
        state.draft.retain(|(lid, _)| *lid != id);
        let removed = state.draft.len() != before;
        if removed {
            state.stats.listeners_removed += 1;
        }
        removed
    }

    fn show_toast(&self, toast: Toast) {
        let mut state = self.state();
        state.toast_subscribers.retain(|tx| tx.send(toast.clone()).is_ok());
        state.toasts.push(toast);
        while state.toasts.len() > MAX_TOAST_HISTORY {
            state.toasts.remove(0);
        }
    }
}
