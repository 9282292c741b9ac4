use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn defaults_cover_the_four_screens() {
    let settings = Settings::default();
    assert_eq!(settings.stream_url, "http://127.0.0.1:8080/status/stream");
    assert_eq!(settings.event_name, "status");
    assert_eq!(settings.target_origin, "*");
    assert_eq!(settings.initial_screen, "intro");
    assert_eq!(settings.screens.len(), 4);
    assert!(settings.screen_map().is_ok());
}

#[test]
fn file_values_override_defaults_and_extend_screens() {
    let mut settings = Settings::default();
    let raw = r#"
stream_url = "http://alfred.local:9000/status/stream"
log_viewport_rows = 8

[screens]
calendar = "/static/calendar.html"
intro = "/static/welcome.html"
"#;
    apply_file(&mut settings, raw, Path::new("shell.toml"));

    assert_eq!(settings.stream_url, "http://alfred.local:9000/status/stream");
    assert_eq!(settings.log_viewport_rows, 8);
    assert_eq!(settings.screens.len(), 5);
    assert_eq!(settings.screens["intro"], "/static/welcome.html");
    assert_eq!(settings.shell_url, Settings::default().shell_url);
}

#[test]
fn malformed_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "stream_url = [", Path::new("shell.toml"));
    assert_eq!(settings, Settings::default());
}

#[test]
fn env_overrides_prefer_app_prefix() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("SHELL_STREAM_URL", "http://short/stream"),
        ("APP__STREAM_URL", "http://app/stream"),
        ("SHELL_EVENT_NAME", "screen"),
        ("SHELL_LOG_ROWS", "not-a-number"),
        ("APP__INITIAL_SCREEN", "guard"),
    ]);
    let mut settings = Settings::default();
    apply_env(&mut settings, |key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(settings.stream_url, "http://app/stream");
    assert_eq!(settings.event_name, "screen");
    assert_eq!(settings.log_viewport_rows, DEFAULT_VIEWPORT_ROWS);
    assert_eq!(settings.initial_screen, "guard");
    assert_eq!(settings.screen_map().expect("map").initial().as_str(), "guard");
}

#[test]
fn unknown_initial_screen_fails_screen_map() {
    let settings = Settings {
        initial_screen: "lobby".into(),
        ..Settings::default()
    };
    assert_eq!(
        settings.screen_map(),
        Err(ScreenMapError::UnknownInitial("lobby".into()))
    );
}

#[test]
fn load_settings_reads_explicit_path() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let temp_root = env::temp_dir().join(format!("status_shell_config_test_{suffix}"));
    fs::create_dir_all(&temp_root).expect("temp root");
    let path = temp_root.join("custom.toml");
    fs::write(&path, "push_url = \"http://example.test/status/push\"\n").expect("write");

    let settings = load_settings(Some(&path));
    assert_eq!(settings.push_url, "http://example.test/status/push");

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[test]
fn missing_explicit_config_falls_back_to_defaults() {
    let path = env::temp_dir().join("status_shell_config_test_missing").join("absent.toml");
    let settings = load_settings(Some(&path));
    assert_eq!(settings.stream_url, Settings::default().stream_url);
    assert_eq!(settings.screens, default_screens());
}
