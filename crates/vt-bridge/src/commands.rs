use crate::command_registry::{
    CommandContext, CommandDescriptor, CommandError, OptionKind, Result,
};

pub const CONNECT: &str = "connect";
pub const OVERRIDE: &str = "override";
pub const CLEAR: &str = "clear";
pub const SAY: &str = "say";

/// Commands the bridge registers with the host while started.
pub fn descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(CONNECT, "Connect to bridge websocket"),
        CommandDescriptor::new(
            OVERRIDE,
            "Toggle override mode, sends all messages NOT with prefix",
        )
        .with_option("value", "boolean of override mode", OptionKind::Boolean, true),
        CommandDescriptor::new(CLEAR, "Clear the chatbox"),
        CommandDescriptor::new(SAY, "Send message to osc").with_option(
            "msg",
            "message to osc",
            OptionKind::String,
            true,
        ),
    ]
}

/// Toolbox entries. These outlive start/stop so the user can always get
/// back to a running bridge, even after the socket dropped.
pub fn toolbox_actions() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new(CONNECT, "Connect"),
        CommandDescriptor::new(CLEAR, "Clear Chatbox"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    /// Tear down and start again.
    Connect,
    Override(bool),
    Clear,
    Say(String),
}

impl BridgeCommand {
    pub fn parse(name: &str, ctx: &CommandContext) -> Result<Self> {
        match name {
            CONNECT => Ok(BridgeCommand::Connect),
            CLEAR => Ok(BridgeCommand::Clear),
            OVERRIDE => ctx
                .get_bool("value")
                .map(BridgeCommand::Override)
                .ok_or_else(|| CommandError::InvalidArgs("/override requires 'value'".into())),
            SAY => ctx
                .get_str("msg")
                .map(|msg| BridgeCommand::Say(msg.to_string()))
                .ok_or_else(|| CommandError::InvalidArgs("/say requires 'msg'".into())),
            other => Err(CommandError::NotFound(other.to_string())),
        }
    }
}
