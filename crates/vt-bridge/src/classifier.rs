//! Prefix protocol for outbound chat text.
//!
//! A message starting with the bridge marker (default `==`) goes to the
//! chatbox instead of the chat; the silent marker (default `==/`) does the
//! same without the notification sound; a message equal to the clear literal
//! (default `=-`) empties the chatbox. Override mode inverts the default
//! routing. Everything here is pure so the controller can apply the result to
//! the host's draft separately.

use vt_core::config::MarkerConfig;

use crate::protocol::BridgeEnvelope;

/// The marker strings in effect for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerSet {
    pub bridge: String,
    pub silent: String,
    pub clear: String,
    pub override_escape: bool,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::from(&MarkerConfig::default())
    }
}

impl From<&MarkerConfig> for MarkerSet {
    fn from(cfg: &MarkerConfig) -> Self {
        Self {
            bridge: cfg.bridge.clone(),
            silent: cfg.silent.clone(),
            clear: cfg.clear.clone(),
            override_escape: cfg.override_escape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Bridge,
    Silent,
}

impl MarkerSet {
    /// Which marker `text` starts with. The silent marker wins when both match.
    pub fn leading_marker(&self, text: &str) -> Option<MarkerKind> {
        if text.starts_with(self.silent.as_str()) {
            Some(MarkerKind::Silent)
        } else if text.starts_with(self.bridge.as_str()) {
            Some(MarkerKind::Bridge)
        } else {
            None
        }
    }

    /// Remove exactly one leading marker. Text without a leading marker is
    /// returned unchanged; markers later in the text are never touched.
    pub fn strip<'a>(&self, text: &'a str) -> &'a str {
        match self.leading_marker(text) {
            Some(MarkerKind::Silent) => &text[self.silent.len()..],
            Some(MarkerKind::Bridge) => &text[self.bridge.len()..],
            None => text,
        }
    }

    pub fn is_clear_request(&self, text: &str) -> bool {
        text.trim() == self.clear
    }
}

/// What to do with one submitted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Let the host send the message, optionally with rewritten text.
    PassThroughToChat { rewrite: Option<String> },
    /// Forward to the bridge and leave the draft alone.
    SendToBridge(BridgeEnvelope),
    /// Forward to the bridge and blank the draft so the host sends nothing.
    SendToBridgeAndClearChat(BridgeEnvelope),
    /// Bridge-bound but empty: blank the draft, send nothing.
    Suppressed,
}

impl Classification {
    pub fn pass_through() -> Self {
        Classification::PassThroughToChat { rewrite: None }
    }

    /// Metric label for this decision.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::PassThroughToChat { rewrite: None } => "pass_through",
            Classification::PassThroughToChat { rewrite: Some(_) } => "escape",
            Classification::SendToBridge(_) => "bridge",
            Classification::SendToBridgeAndClearChat(_) => "bridge_clear",
            Classification::Suppressed => "suppressed",
        }
    }
}

fn marked_envelope(kind: MarkerKind, content: &str) -> Classification {
    if content.trim().is_empty() {
        return Classification::Suppressed;
    }
    let envelope = match kind {
        MarkerKind::Bridge => BridgeEnvelope::new(content),
        MarkerKind::Silent => BridgeEnvelope::silent(content),
    };
    Classification::SendToBridgeAndClearChat(envelope)
}

/// Decide the fate of a submitted message.
///
/// Surrounding whitespace only matters for the decision. Whatever follows
/// the marker is forwarded verbatim, and override-mode text is sent exactly
/// as submitted.
pub fn classify(text: &str, override_mode: bool, markers: &MarkerSet) -> Classification {
    let trimmed = text.trim();

    if markers.is_clear_request(trimmed) {
        return Classification::SendToBridgeAndClearChat(BridgeEnvelope::clear());
    }

    let marked = text.trim_start();
    match (override_mode, markers.leading_marker(marked)) {
        (false, None) => Classification::pass_through(),
        (false, Some(kind)) => marked_envelope(kind, markers.strip(marked)),
        (true, Some(_)) if markers.override_escape => Classification::PassThroughToChat {
            rewrite: Some(markers.strip(marked).to_string()),
        },
        (true, Some(kind)) => marked_envelope(kind, markers.strip(marked)),
        (true, None) if trimmed.is_empty() => Classification::Suppressed,
        (true, None) => Classification::SendToBridgeAndClearChat(BridgeEnvelope::new(text)),
    }
}

/// Whether a live draft is a bridge message being composed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftIntent {
    Idle,
    Composing { live: String },
}

/// Classify a draft-changed event. Only drives heartbeats and procedural
/// forwarding; submitting is handled by [`classify`].
pub fn classify_draft(
    text: &str,
    override_mode: bool,
    markers: &MarkerSet,
    min_len: usize,
) -> DraftIntent {
    let trimmed = text.trim();
    if trimmed.chars().count() <= min_len || markers.is_clear_request(trimmed) {
        return DraftIntent::Idle;
    }

    let marked = text.trim_start();
    let live = match (override_mode, markers.leading_marker(marked)) {
        (false, None) => return DraftIntent::Idle,
        (true, Some(_)) if markers.override_escape => return DraftIntent::Idle,
        (_, Some(_)) => markers.strip(marked),
        (true, None) => text,
    };
    if live.trim().is_empty() {
        return DraftIntent::Idle;
    }
    DraftIntent::Composing {
        live: live.to_string(),
    }
}
