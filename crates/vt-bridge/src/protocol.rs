use serde::{Deserialize, Serialize};

pub const TYPING_TRUE: &str = "typing:true";
pub const TYPING_FALSE: &str = "typing:false";

/// One message for the chatbox on the receiving end.
///
/// Serialized as a flat JSON object with exactly three fields. The wire names
/// (`content`, `immediate`, `popNoise`) are what the external OSC receiver
/// reads and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeEnvelope {
    pub content: String,
    #[serde(rename = "immediate")]
    pub send_immediately: bool,
    #[serde(rename = "popNoise")]
    pub pop_noise: bool,
}

impl BridgeEnvelope {
    /// A submitted message: shown immediately, with the notification sound.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            send_immediately: true,
            pop_noise: true,
        }
    }

    /// A submitted message shown without the notification sound.
    pub fn silent(content: impl Into<String>) -> Self {
        Self {
            pop_noise: false,
            ..Self::new(content)
        }
    }

    /// Live draft content forwarded while the user is still typing.
    pub fn procedural(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            send_immediately: false,
            pop_noise: false,
        }
    }

    /// Empties the remote chatbox.
    pub fn clear() -> Self {
        Self::procedural(String::new())
    }

    pub fn is_clear(&self) -> bool {
        self.content.is_empty() && !self.send_immediately
    }
}

/// Everything that can travel over the bridge socket.
///
/// Heartbeats are bare text tokens, not JSON; a receiver tells the two apart
/// by the leading `{` of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Envelope(BridgeEnvelope),
    Typing(bool),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("unrecognised frame: {0:?}")]
    UnknownToken(String),
}

impl WireFrame {
    pub fn heartbeat(is_typing: bool) -> Self {
        WireFrame::Typing(is_typing)
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        match self {
            WireFrame::Envelope(envelope) => Ok(serde_json::to_string(envelope)?),
            WireFrame::Typing(true) => Ok(TYPING_TRUE.to_string()),
            WireFrame::Typing(false) => Ok(TYPING_FALSE.to_string()),
        }
    }

    pub fn decode(text: &str) -> Result<Self, CodecError> {
        if text.starts_with('{') {
            return Ok(WireFrame::Envelope(serde_json::from_str(text)?));
        }
        match text {
            TYPING_TRUE => Ok(WireFrame::Typing(true)),
            TYPING_FALSE => Ok(WireFrame::Typing(false)),
            other => Err(CodecError::UnknownToken(other.to_string())),
        }
    }

    /// Metric label for this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            WireFrame::Envelope(_) => "envelope",
            WireFrame::Typing(_) => "heartbeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_receiver_field_names() {
        let json = WireFrame::Envelope(BridgeEnvelope::new("hi")).encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["content"], "hi");
        assert_eq!(obj["immediate"], true);
        assert_eq!(obj["popNoise"], true);
    }

    #[test]
    fn heartbeats_are_bare_tokens() {
        assert_eq!(WireFrame::heartbeat(true).encode().unwrap(), "typing:true");
        assert_eq!(WireFrame::heartbeat(false).encode().unwrap(), "typing:false");
    }

    #[test]
    fn decode_distinguishes_by_leading_brace() {
        let frame = WireFrame::decode(r#"{"content":"a","immediate":false,"popNoise":false}"#)
            .unwrap();
        assert_eq!(frame, WireFrame::Envelope(BridgeEnvelope::procedural("a")));
        assert_eq!(WireFrame::decode("typing:false").unwrap(), WireFrame::Typing(false));
    }

    #[test]
    fn decode_rejects_unknown_token() {
        assert!(matches!(
            WireFrame::decode("typing:maybe"),
            Err(CodecError::UnknownToken(t)) if t == "typing:maybe"
        ));
    }

    #[test]
    fn decode_rejects_extra_fields() {
        let err = WireFrame::decode(
            r#"{"content":"a","immediate":true,"popNoise":true,"channel":"x"}"#,
        );
        assert!(matches!(err, Err(CodecError::Envelope(_))));
    }

    #[test]
    fn clear_envelope_shape() {
        let clear = BridgeEnvelope::clear();
        assert!(clear.is_clear());
        assert_eq!(clear.content, "");
        assert!(!clear.send_immediately);
        assert!(!clear.pop_noise);
        assert!(!BridgeEnvelope::new("").is_clear());
    }

    #[test]
    fn envelope_content_is_escaped() {
        let json = WireFrame::Envelope(BridgeEnvelope::silent("say \"hi\"\n"))
            .encode()
            .unwrap();
        assert!(json.starts_with('{'));
        let back = WireFrame::decode(&json).unwrap();
        assert_eq!(back, WireFrame::Envelope(BridgeEnvelope::silent("say \"hi\"\n")));
    }
}
