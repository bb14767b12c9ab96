//! Chat-to-chatbox bridge.
//!
//! Watches a chat client's outgoing messages and draft text, diverts
//! marker-prefixed messages to a local websocket bridge, and keeps the
//! remote typing indicator alive while the user composes.
//!
//! Key modules:
//! - [`protocol`] -- envelope and heartbeat wire format
//! - [`classifier`] -- prefix rules deciding where a message goes
//! - [`throttle`] -- heartbeat and live-draft rate limiting
//! - [`transport`] -- the outbound websocket connection
//! - [`host`] -- the chat client surface and an in-process host
//! - [`controller`] -- lifecycle, hooks and commands

pub mod classifier;
pub mod command_registry;
pub mod commands;
pub mod controller;
pub mod host;
pub mod protocol;
pub mod throttle;
pub mod transport;

pub use controller::{BridgeController, BridgeError, BridgeHandle, BridgeSettings, LifecycleState};
pub use host::{ChatHost, LocalHost, MessageDraft};
