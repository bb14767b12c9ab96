//! Shared configuration for the vrc-text-bridge workspace.
//!
//! - [`config`] -- the TOML-backed [`config::Config`] and its validation rules
//! - [`settings`] -- on-disk persistence and the runtime [`settings::OverrideMode`] flag

pub mod config;
pub mod settings;
