use vt_bridge::classifier::{classify, classify_draft, Classification, DraftIntent, MarkerSet};
use vt_bridge::protocol::{BridgeEnvelope, WireFrame};
use vt_core::config::Config;

fn markers_from(toml: &str) -> MarkerSet {
    let cfg = Config::from_toml(toml).expect("parse config");
    MarkerSet::from(&cfg.markers)
}

#[test]
fn configured_markers_drive_classification() {
    let markers = markers_from(
        r#"
[markers]
bridge = ">>"
silent = ">>/"
clear = ">>clear"
"#,
    );

    assert_eq!(
        classify(">>hello", false, &markers),
        Classification::SendToBridgeAndClearChat(BridgeEnvelope::new("hello"))
    );
    assert_eq!(
        classify(">>/hello", false, &markers),
        Classification::SendToBridgeAndClearChat(BridgeEnvelope::silent("hello"))
    );
    assert_eq!(
        classify(">>clear", false, &markers),
        Classification::SendToBridgeAndClearChat(BridgeEnvelope::clear())
    );
    assert_eq!(classify("==hello", false, &markers), Classification::pass_through());
}

#[test]
fn disabled_escape_keeps_marked_text_on_bridge() {
    let markers = markers_from(
        r#"
[markers]
override_escape = false
"#,
    );
    assert_eq!(
        classify("==hi", true, &markers),
        Classification::SendToBridgeAndClearChat(BridgeEnvelope::new("hi"))
    );
    assert_eq!(
        classify_draft("==hi there", true, &markers, 3),
        DraftIntent::Composing {
            live: "hi there".into()
        }
    );
}

#[test]
fn classified_envelope_encodes_for_the_receiver() {
    let Classification::SendToBridgeAndClearChat(env) =
        classify("==/quiet please", false, &MarkerSet::default())
    else {
        panic!("expected a bridge send");
    };
    let text = WireFrame::Envelope(env).encode().unwrap();
    assert_eq!(
        text,
        r#"{"content":"quiet please","immediate":true,"popNoise":false}"#
    );
}
