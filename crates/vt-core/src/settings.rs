use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Config, ConfigError};

/// Manages loading and saving settings to a TOML file on disk.
pub struct SettingsManager {
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new `SettingsManager` that reads/writes the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a `SettingsManager` at the default config location
    /// (`~/.vrc-text-bridge/config.toml`).
    pub fn default_path() -> Self {
        Self {
            path: Config::default_path(),
        }
    }

    /// Load config from the TOML file on disk.
    pub fn load(&self) -> Result<Config, ConfigError> {
        Config::load_from(&self.path)
    }

    /// Save config to the TOML file on disk, creating parent directories if
    /// they don't exist.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let text = config.to_toml()?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }
        std::fs::write(&self.path, text).map_err(|e| ConfigError::Io(e.to_string()))?;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Load config from disk, falling back to `Config::default()` when the
    /// file is missing or unparseable.
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(cfg) => cfg,
            Err(e) => {
                if self.path.exists() {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable settings");
                }
                Config::default()
            }
        }
    }

    /// Return the file path this manager reads/writes.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

// ---------------------------------------------------------------------------
// OverrideMode
// ---------------------------------------------------------------------------

/// Shared override-mode flag.
///
/// Clones observe the same value. The classifier only reads it; the
/// `override` command is the single writer.
#[derive(Debug, Clone, Default)]
pub struct OverrideMode(Arc<AtomicBool>);

impl OverrideMode {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.bridge.override_mode)
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag, returning the previous value.
    pub fn set(&self, enabled: bool) -> bool {
        self.0.swap(enabled, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
