use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.vrc-text-bridge/config.toml`.
///
/// Every section and field has a default, so an empty or partial file is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
}

impl Config {
    /// Load config from `~/.vrc-text-bridge/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.bridge.validate()?;
        self.markers.validate()?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vrc-text-bridge")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "general.log_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Connection and timing settings for the outbound bridge socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// How long `start` waits for the socket to open before giving up.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    /// Minimum gap between two `typing:true` heartbeats.
    #[serde(default = "default_typing_interval_ms")]
    pub typing_interval_ms: u64,
    /// Minimum gap between two mid-composition forwards of the live draft.
    #[serde(default = "default_procedural_interval_ms")]
    pub procedural_interval_ms: u64,
    /// Drafts at or below this many characters never count as composing.
    #[serde(default = "default_procedural_min_len")]
    pub procedural_min_len: usize,
    #[serde(default)]
    pub override_mode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            ready_timeout_ms: default_ready_timeout_ms(),
            typing_interval_ms: default_typing_interval_ms(),
            procedural_interval_ms: default_procedural_interval_ms(),
            procedural_min_len: default_procedural_min_len(),
            override_mode: false,
        }
    }
}

pub const TYPING_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 1000..=3000;

impl BridgeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.trim();
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(ConfigError::Validation(format!(
                "bridge.endpoint '{}' must be a ws:// or wss:// url",
                self.endpoint
            )));
        }
        if self.ready_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "bridge.ready_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if !TYPING_INTERVAL_RANGE_MS.contains(&self.typing_interval_ms) {
            return Err(ConfigError::Validation(format!(
                "bridge.typing_interval_ms must be within {}..={} (got {})",
                TYPING_INTERVAL_RANGE_MS.start(),
                TYPING_INTERVAL_RANGE_MS.end(),
                self.typing_interval_ms
            )));
        }
        if self.procedural_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "bridge.procedural_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:6942".into()
}
fn default_ready_timeout_ms() -> u64 {
    1000
}
fn default_typing_interval_ms() -> u64 {
    1500
}
fn default_procedural_interval_ms() -> u64 {
    1050
}
fn default_procedural_min_len() -> usize {
    3
}

/// Textual prefixes that route a chat message to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerConfig {
    #[serde(default = "default_bridge_marker")]
    pub bridge: String,
    #[serde(default = "default_silent_marker")]
    pub silent: String,
    /// A whole message equal to this literal clears the remote chatbox.
    #[serde(default = "default_clear_literal")]
    pub clear: String,
    /// In override mode, a marker-prefixed message escapes back to normal chat.
    #[serde(default = "default_true")]
    pub override_escape: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            bridge: default_bridge_marker(),
            silent: default_silent_marker(),
            clear: default_clear_literal(),
            override_escape: true,
        }
    }
}

impl MarkerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("bridge", &self.bridge),
            ("silent", &self.silent),
            ("clear", &self.clear),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "markers.{field} must not be empty"
                )));
            }
            if value.trim() != value.as_str() {
                return Err(ConfigError::Validation(format!(
                    "markers.{field} must not contain leading or trailing whitespace"
                )));
            }
        }
        if self.bridge == self.silent {
            return Err(ConfigError::Validation(
                "markers.silent must differ from markers.bridge".to_string(),
            ));
        }
        if self.clear == self.bridge || self.clear == self.silent {
            return Err(ConfigError::Validation(format!(
                "markers.clear '{}' collides with a routing marker",
                self.clear
            )));
        }
        Ok(())
    }
}

fn default_bridge_marker() -> String {
    "==".into()
}
fn default_silent_marker() -> String {
    "==/".into()
}
fn default_clear_literal() -> String {
    "=-".into()
}
fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_http_endpoint() {
        let mut cfg = Config::default();
        cfg.bridge.endpoint = "http://127.0.0.1:6942".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("bridge.endpoint"));
    }

    #[test]
    fn rejects_typing_interval_out_of_range() {
        let mut cfg = Config::default();
        cfg.bridge.typing_interval_ms = 250;
        assert!(cfg.validate().is_err());
        cfg.bridge.typing_interval_ms = 3000;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_colliding_markers() {
        let mut cfg = Config::default();
        cfg.markers.silent = "==".into();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.markers.clear = "==/".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("markers.clear"));
    }

    #[test]
    fn rejects_padded_marker() {
        let mut cfg = Config::default();
        cfg.markers.bridge = " ==".into();
        assert!(cfg.validate().is_err());
    }
}
