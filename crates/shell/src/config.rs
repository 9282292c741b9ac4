use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;
use tracing::warn;

use crate::{
    message_log::DEFAULT_VIEWPORT_ROWS,
    screens::{default_screens, ScreenMap, ScreenMapError, INTRO},
};

pub const DEFAULT_CONFIG_FILE: &str = "shell.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub shell_url: String,
    pub stream_url: String,
    pub push_url: String,
    pub event_name: String,
    pub target_origin: String,
    pub initial_screen: String,
    pub screens: BTreeMap<String, String>,
    pub log_viewport_rows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell_url: "http://127.0.0.1:8080/".into(),
            stream_url: "http://127.0.0.1:8080/status/stream".into(),
            push_url: "http://127.0.0.1:8080/status/push".into(),
            event_name: "status".into(),
            target_origin: "*".into(),
            initial_screen: INTRO.into(),
            screens: default_screens(),
            log_viewport_rows: DEFAULT_VIEWPORT_ROWS,
        }
    }
}

impl Settings {
    pub fn screen_map(&self) -> Result<ScreenMap, ScreenMapError> {
        ScreenMap::new(self.screens.clone(), &self.initial_screen)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    shell_url: Option<String>,
    stream_url: Option<String>,
    push_url: Option<String>,
    event_name: Option<String>,
    target_origin: Option<String>,
    initial_screen: Option<String>,
    log_viewport_rows: Option<usize>,
    #[serde(default)]
    screens: BTreeMap<String, String>,
}

/// Defaults, then `shell.toml` (or `path`), then environment overrides.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();
    let explicit = path.is_some();
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw, path),
        Err(error) if explicit => {
            warn!(path = %path.display(), %error, "cannot read shell config, using defaults");
        }
        Err(_) => {}
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str, path: &Path) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable shell config");
            return;
        }
    };

    if let Some(v) = file_cfg.shell_url {
        settings.shell_url = v;
    }
    if let Some(v) = file_cfg.stream_url {
        settings.stream_url = v;
    }
    if let Some(v) = file_cfg.push_url {
        settings.push_url = v;
    }
    if let Some(v) = file_cfg.event_name {
        settings.event_name = v;
    }
    if let Some(v) = file_cfg.target_origin {
        settings.target_origin = v;
    }
    if let Some(v) = file_cfg.initial_screen {
        settings.initial_screen = v;
    }
    if let Some(v) = file_cfg.log_viewport_rows {
        settings.log_viewport_rows = v;
    }
    settings.screens.extend(file_cfg.screens);
}

fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    // APP__* wins over SHELL_* when both are set.
    let var = |short: &str, app: &str| lookup(app).or_else(|| lookup(short));

    if let Some(v) = var("SHELL_URL", "APP__SHELL_URL") {
        settings.shell_url = v;
    }
    if let Some(v) = var("SHELL_STREAM_URL", "APP__STREAM_URL") {
        settings.stream_url = v;
    }
    if let Some(v) = var("SHELL_PUSH_URL", "APP__PUSH_URL") {
        settings.push_url = v;
    }
    if let Some(v) = var("SHELL_EVENT_NAME", "APP__EVENT_NAME") {
        settings.event_name = v;
    }
    if let Some(v) = var("SHELL_TARGET_ORIGIN", "APP__TARGET_ORIGIN") {
        settings.target_origin = v;
    }
    if let Some(v) = var("SHELL_INITIAL_SCREEN", "APP__INITIAL_SCREEN") {
        settings.initial_screen = v;
    }
    if let Some(v) = var("SHELL_LOG_ROWS", "APP__LOG_ROWS") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.log_viewport_rows = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
