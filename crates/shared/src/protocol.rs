use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ScreenName;

pub const STATUS: &str = "status";
pub const SCREEN_CHANGED: &str = "screen:changed";

pub const SCREEN_DIRECTIVE_MARKER: &str = "screen:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    pub fn new(kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self::new(STATUS, Value::String(text.into()))
    }

    pub fn screen_changed(screen: &ScreenName) -> Self {
        Self::new(SCREEN_CHANGED, Value::String(screen.as_str().to_string()))
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let kind = object.get("type")?.as_str()?;
        Some(Self {
            kind: kind.to_string(),
            payload: object.get("payload").cloned().unwrap_or(Value::Null),
        })
    }
}

/// Only the segment between the first and second `:` counts, trimmed.
pub fn screen_directive(text: &str) -> Option<&str> {
    if !text.contains(SCREEN_DIRECTIVE_MARKER) {
        return None;
    }
    text.split(':').nth(1).map(str::trim)
}
