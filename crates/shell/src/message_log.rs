use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bus::{Bus, Handler};
use chrono::{DateTime, Utc};
use serde_json::Value;
use shared::{error::BusError, protocol::STATUS};

pub const DEFAULT_VIEWPORT_ROWS: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl LogEntry {
    /// Display rows; an empty entry still occupies one.
    pub fn rows(&self) -> Vec<&str> {
        if self.text.is_empty() {
            return vec![""];
        }
        self.text.lines().collect()
    }
}

pub fn render_payload(payload: &Value) -> String {
    match payload {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| raw.clone()),
            Err(_) => raw.clone(),
        },
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

type Renderer = Arc<dyn Fn(&LogEntry) + Send + Sync>;

#[derive(Clone)]
pub struct MessageLog {
    state: Arc<Mutex<LogState>>,
    renderer: Option<Renderer>,
}

struct LogState {
    entries: Vec<LogEntry>,
    viewport_rows: usize,
    scroll_top: usize,
}

impl MessageLog {
    pub fn new(viewport_rows: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LogState {
                entries: Vec::new(),
                viewport_rows: viewport_rows.max(1),
                scroll_top: 0,
            })),
            renderer: None,
        }
    }

    pub fn with_renderer<F>(mut self, renderer: F) -> Self
    where
        F: Fn(&LogEntry) + Send + Sync + 'static,
    {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn attach(&self, bus: &Bus) -> Result<Handler, BusError> {
        let log = self.clone();
        let handler = Handler::new(move |payload, _event| {
            log.append(payload);
            Ok(())
        });
        bus.subscribe(STATUS, handler.clone())?;
        Ok(handler)
    }

    pub fn append(&self, payload: &Value) -> LogEntry {
        let entry = LogEntry {
            text: render_payload(payload),
            received_at: Utc::now(),
        };
        {
            let mut state = self.state();
            state.entries.push(entry.clone());
            state.scroll_top = state.max_scroll();
        }
        if let Some(renderer) = &self.renderer {
            renderer(&entry);
        }
        entry
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.state().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    pub fn scroll_height(&self) -> usize {
        self.state().scroll_height()
    }

    pub fn scroll_top(&self) -> usize {
        self.state().scroll_top
    }

    pub fn scroll_to(&self, row: usize) {
        let mut state = self.state();
        state.scroll_top = row.min(state.max_scroll());
    }

    pub fn is_scrolled_to_bottom(&self) -> bool {
        let state = self.state();
        state.scroll_top >= state.max_scroll()
    }

    pub fn visible_rows(&self) -> Vec<String> {
        let state = self.state();
        state
            .entries
            .iter()
            .flat_map(LogEntry::rows)
            .map(str::to_string)
            .skip(state.scroll_top)
            .take(state.viewport_rows)
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWPORT_ROWS)
    }
}

impl LogState {
    fn scroll_height(&self) -> usize {
        self.entries.iter().map(|entry| entry.rows().len()).sum()
    }

    fn max_scroll(&self) -> usize {
        self.scroll_height().saturating_sub(self.viewport_rows)
    }
}

#[cfg(test)]
#[path = "tests/message_log_tests.rs"]
mod tests;
