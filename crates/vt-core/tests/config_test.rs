use vt_core::config::{Config, LogFormat};
use vt_core::settings::SettingsManager;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, LogFormat::Human);
    assert_eq!(cfg.bridge.endpoint, "ws://127.0.0.1:6942");
    assert_eq!(cfg.bridge.ready_timeout_ms, 1000);
    assert_eq!(cfg.bridge.typing_interval_ms, 1500);
    assert_eq!(cfg.bridge.procedural_interval_ms, 1050);
    assert!(!cfg.bridge.override_mode);
    assert_eq!(cfg.markers.bridge, "==");
    assert_eq!(cfg.markers.silent, "==/");
    assert_eq!(cfg.markers.clear, "=-");
    assert!(cfg.markers.override_escape);
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("ws://127.0.0.1:6942"));

    let parsed = Config::from_toml(&toml_str).expect("parse toml back");
    assert_eq!(parsed.bridge.endpoint, cfg.bridge.endpoint);
    assert_eq!(parsed.markers.silent, cfg.markers.silent);
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[general]
log_format = "json"

[markers]
silent = "=/="
"#;
    let cfg = Config::from_toml(partial).expect("parse partial");
    assert_eq!(cfg.general.log_format, LogFormat::Json);
    assert_eq!(cfg.markers.silent, "=/=");
    // defaults should fill in the rest
    assert_eq!(cfg.markers.bridge, "==");
    assert_eq!(cfg.bridge.typing_interval_ms, 1500);
}

#[test]
fn invalid_endpoint_fails_parse() {
    let text = r#"
[bridge]
endpoint = "127.0.0.1:6942"
"#;
    let err = Config::from_toml(text).expect_err("validation should fail");
    assert!(err.to_string().contains("bridge.endpoint"));
}

#[test]
fn malformed_toml_is_parse_error() {
    let err = Config::from_toml("[bridge\nendpoint = ").unwrap_err();
    assert!(err.to_string().starts_with("parse:"));
}

#[test]
fn settings_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    let mgr = SettingsManager::new(&path);

    let mut cfg = Config::default();
    cfg.bridge.override_mode = true;
    cfg.bridge.endpoint = "ws://127.0.0.1:7000".into();
    mgr.save(&cfg).unwrap();
    assert!(path.exists());

    let loaded = mgr.load().unwrap();
    assert!(loaded.bridge.override_mode);
    assert_eq!(loaded.bridge.endpoint, "ws://127.0.0.1:7000");
}

#[test]
fn settings_refuse_to_save_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = SettingsManager::new(dir.path().join(format!("{}.toml", uuid::Uuid::new_v4())));

    let mut cfg = Config::default();
    cfg.markers.clear = cfg.markers.bridge.clone();
    assert!(mgr.save(&cfg).is_err());
    assert!(!mgr.path().exists());
}

#[test]
fn load_or_default_ignores_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "not = [valid").unwrap();

    let cfg = SettingsManager::new(&path).load_or_default();
    assert_eq!(cfg.markers.bridge, "==");
}
