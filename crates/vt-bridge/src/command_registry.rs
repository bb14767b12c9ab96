use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("command handler is gone: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, CommandError>;

// ---------------------------------------------------------------------------
// CommandSource -- where the command was triggered from
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    SlashCommand,
    Toolbox,
    Cli,
    Internal,
}

impl std::fmt::Display for CommandSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandSource::SlashCommand => write!(f, "slash"),
            CommandSource::Toolbox => write!(f, "toolbox"),
            CommandSource::Cli => write!(f, "cli"),
            CommandSource::Internal => write!(f, "internal"),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandContext -- arguments passed to a command
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandContext {
    pub source: CommandSource,
    /// Key-value parameters, keyed by option name.
    pub params: AHashMap<String, serde_json::Value>,
}

impl CommandContext {
    pub fn new(source: CommandSource) -> Self {
        Self {
            source,
            params: AHashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(|v| v.as_bool())
    }
}

// ---------------------------------------------------------------------------
// CommandOutput -- the reply shown to the user
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CommandDescriptor -- what a command looks like to the host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    String,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Unique command name, typed after the slash.
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOption>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
        }
    }

    pub fn with_option(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        kind: OptionKind,
        required: bool,
    ) -> Self {
        self.options.push(CommandOption {
            name: name.into(),
            description: description.into(),
            kind,
            required,
        });
        self
    }

    /// Build a context from raw text typed after the command name.
    ///
    /// A command with a single option takes the whole text as that option's
    /// value; otherwise values are whitespace-separated and positional.
    pub fn parse_args(&self, source: CommandSource, raw: &str) -> Result<CommandContext> {
        let raw = raw.trim();
        let values: Vec<&str> = match self.options.len() {
            0 => Vec::new(),
            1 if raw.is_empty() => Vec::new(),
            1 => vec![raw],
            _ => raw.split_whitespace().collect(),
        };

        let mut ctx = CommandContext::new(source);
        for (option, value) in self.options.iter().zip(values) {
            let parsed = match option.kind {
                OptionKind::String => serde_json::Value::String(value.to_string()),
                OptionKind::Boolean => serde_json::Value::Bool(parse_bool(value).ok_or_else(
                    || {
                        CommandError::InvalidArgs(format!(
                            "'{}' expects true or false, got '{value}'",
                            option.name
                        ))
                    },
                )?),
            };
            ctx.params.insert(option.name.clone(), parsed);
        }
        self.check(&ctx)?;
        Ok(ctx)
    }

    /// Verify every required option is present with the right type.
    pub fn check(&self, ctx: &CommandContext) -> Result<()> {
        for option in &self.options {
            let present = match option.kind {
                OptionKind::String => ctx.get_str(&option.name).is_some(),
                OptionKind::Boolean => ctx.get_bool(&option.name).is_some(),
            };
            if option.required && !present {
                return Err(CommandError::InvalidArgs(format!(
                    "/{} requires '{}'",
                    self.name, option.name
                )));
            }
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// A command call routed to whoever registered the command.
#[derive(Debug)]
pub struct CommandInvocation {
    pub name: String,
    pub ctx: CommandContext,
    pub reply: oneshot::Sender<CommandOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn override_cmd() -> CommandDescriptor {
        CommandDescriptor::new("override", "Toggle override").with_option(
            "value",
            "override on or off",
            OptionKind::Boolean,
            true,
        )
    }

    #[test]
    fn parse_bool_option() {
        let ctx = override_cmd()
            .parse_args(CommandSource::SlashCommand, " on ")
            .unwrap();
        assert_eq!(ctx.get_bool("value"), Some(true));
        assert_eq!(ctx.source, CommandSource::SlashCommand);
    }

    #[test]
    fn reject_bad_bool() {
        let err = override_cmd()
            .parse_args(CommandSource::Cli, "maybe")
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidArgs(_)));
    }

    #[test]
    fn missing_required_option() {
        let err = override_cmd().parse_args(CommandSource::Cli, "").unwrap_err();
        assert!(err.to_string().contains("requires 'value'"));
    }

    #[test]
    fn single_string_option_takes_whole_text() {
        let say = CommandDescriptor::new("say", "Send").with_option(
            "msg",
            "message",
            OptionKind::String,
            true,
        );
        let ctx = say.parse_args(CommandSource::Cli, "hello there world").unwrap();
        assert_eq!(ctx.get_str("msg"), Some("hello there world"));
    }

    #[test]
    fn no_option_command_ignores_text() {
        let connect = CommandDescriptor::new("connect", "Reconnect");
        let ctx = connect.parse_args(CommandSource::Toolbox, "whatever").unwrap();
        assert!(ctx.params.is_empty());
    }
}
