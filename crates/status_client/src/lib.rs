use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{CannotCloneRequestError, Event, EventSource};
use thiserror::Error;
use tracing::{debug, error, info, trace};

pub const DEFAULT_EVENT_NAME: &str = "status";
pub const DEFAULT_STREAM_PATH: &str = "/status/stream";
pub const DEFAULT_PUSH_PATH: &str = "/status/push";

#[derive(Debug, Error)]
pub enum StatusStreamError {
    #[error("cannot open status stream {url}: {source}")]
    Open {
        url: String,
        source: CannotCloneRequestError,
    },
    #[error("status stream needs a running tokio runtime: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("status stream transport error: {0}")]
    Transport(#[from] reqwest_eventsource::Error),
}

type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&StatusStreamError) + Send + Sync>;

struct Callbacks {
    on_message: Vec<MessageCallback>,
    on_error: ErrorCallback,
}

pub struct StatusStream {
    http: Client,
    url: String,
    event_name: String,
    callbacks: Arc<Mutex<Callbacks>>,
    connected: AtomicBool,
}

impl StatusStream {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            event_name: DEFAULT_EVENT_NAME.to_string(),
            callbacks: Arc::new(Mutex::new(Callbacks {
                on_message: Vec::new(),
                on_error: Arc::new(|_| {}),
            })),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    pub fn listen<M>(&self, on_message: M) -> Result<(), StatusStreamError>
    where
        M: Fn(&str) + Send + Sync + 'static,
    {
        self.register(Arc::new(on_message), None)
    }

    /// Like [`StatusStream::listen`], and also installs `on_error`, replacing
    /// any earlier error callback.
    pub fn listen_with_error<M, E>(&self, on_message: M, on_error: E) -> Result<(), StatusStreamError>
    where
        M: Fn(&str) + Send + Sync + 'static,
        E: Fn(&StatusStreamError) + Send + Sync + 'static,
    {
        self.register(Arc::new(on_message), Some(Arc::new(on_error)))
    }

    fn register(
        &self,
        on_message: MessageCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), StatusStreamError> {
        {
            let mut callbacks = lock(&self.callbacks);
            callbacks.on_message.push(on_message);
            if let Some(on_error) = on_error {
                callbacks.on_error = on_error;
            }
        }

        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|error| {
            self.connected.store(false, Ordering::SeqCst);
            StatusStreamError::NoRuntime(error)
        })?;
        let request = self
            .http
            .get(&self.url)
            .header("Accept", "text/event-stream");
        let source = EventSource::new(request).map_err(|source| {
            self.connected.store(false, Ordering::SeqCst);
            StatusStreamError::Open {
                url: self.url.clone(),
                source,
            }
        })?;

        debug!(url = %self.url, event = %self.event_name, "connecting status stream");
        runtime.spawn(pump(
            source,
            self.url.clone(),
            self.event_name.clone(),
            Arc::clone(&self.callbacks),
        ));
        Ok(())
    }
}

async fn pump(
    mut source: EventSource,
    url: String,
    event_name: String,
    callbacks: Arc<Mutex<Callbacks>>,
) {
    while let Some(event) = source.next().await {
        match event {
            Ok(Event::Open) => info!(%url, "status stream open"),
            Ok(Event::Message(message)) => {
                if message.event != event_name {
                    trace!(%url, event = %message.event, "ignoring event");
                    continue;
                }
                let handlers = lock(&callbacks).on_message.clone();
                for handler in handlers {
                    handler(&message.data);
                }
            }
            Err(err) => {
                error!(%url, error = %err, "status stream error");
                let on_error = Arc::clone(&lock(&callbacks).on_error);
                on_error(&StatusStreamError::Transport(err));
            }
        }
    }
    debug!(%url, "status stream closed");
}

fn lock(callbacks: &Mutex<Callbacks>) -> MutexGuard<'_, Callbacks> {
    callbacks.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct StatusPusher {
    http: Client,
    url: String,
}

impl StatusPusher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    pub async fn push(&self, text: &str) -> Result<()> {
        self.http
            .post(&self.url)
            .form(&[("msg", text)])
            .send()
            .await
            .with_context(|| format!("failed to reach push endpoint {}", self.url))?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
