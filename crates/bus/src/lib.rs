use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use serde_json::Value;
use shared::{domain::FrameId, error::BusError, protocol::Message};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, trace, warn};

pub mod frame;

pub use frame::{Delivery, Frame, MessageEvent, TargetOrigin, ANY_ORIGIN, SAME_ORIGIN};

type HandlerFn = dyn Fn(&Value, &MessageEvent) -> anyhow::Result<()> + Send + Sync;

/// A subscriber callback. Identity is the allocation: keep a clone of the
/// value passed to [`Bus::subscribe`] to unsubscribe it later.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &MessageEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    fn is(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub queued: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

struct BusInner {
    frame: Frame,
    listeners: Mutex<HashMap<String, Vec<Handler>>>,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<MessageEvent>>,
}

impl Bus {
    pub fn attach(frame: &Frame) -> Self {
        let inbox = frame.listen();
        debug!(frame = %frame.id(), location = %frame.location(), "bus attached");
        Self {
            inner: Arc::new(BusInner {
                frame: frame.clone(),
                listeners: Mutex::new(HashMap::new()),
                inbox: AsyncMutex::new(inbox),
            }),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.inner.frame
    }

    pub fn frame_id(&self) -> FrameId {
        self.inner.frame.id()
    }

    pub fn subscribe(&self, kind: &str, handler: Handler) -> Result<(), BusError> {
        if kind.is_empty() {
            return Err(BusError::InvalidType);
        }
        self.listeners()
            .entry(kind.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    pub fn unsubscribe(&self, kind: &str, handler: &Handler) {
        let mut listeners = self.listeners();
        if let Some(handlers) = listeners.get_mut(kind) {
            handlers.retain(|registered| !registered.is(handler));
            if handlers.is_empty() {
                listeners.remove(kind);
            }
        }
    }

    pub fn subscriber_count(&self, kind: &str) -> usize {
        self.listeners().get(kind).map_or(0, Vec::len)
    }

    pub fn publish<T: Serialize>(
        &self,
        message: &T,
        target_origin: &str,
    ) -> Result<PublishReport, BusError> {
        let data = serde_json::to_value(message).map_err(|_| BusError::InvalidMessage)?;
        let kind = Message::from_value(&data)
            .map(|message| message.kind)
            .ok_or(BusError::InvalidMessage)?;
        if kind.is_empty() {
            return Err(BusError::InvalidType);
        }
        let target_origin = TargetOrigin::parse(target_origin)?;

        let frame = &self.inner.frame;
        let mut targets = Vec::new();
        if let Some(parent) = frame.parent() {
            targets.push(parent);
        }
        targets.extend(frame.children());
        targets.push(frame.clone());

        let mut report = PublishReport::default();
        for target in &targets {
            match target.post_message(&data, &target_origin, frame) {
                Ok(Delivery::Queued) => report.queued += 1,
                Ok(Delivery::Filtered | Delivery::Unobserved) => report.skipped += 1,
                Err(error) => {
                    trace!(frame = %frame.id(), target = %target.id(), %error, "post to frame failed");
                    report.failed += 1;
                }
            }
        }
        trace!(frame = %frame.id(), kind = %kind, ?report, "published");
        Ok(report)
    }

    pub fn post(&self, kind: &str, payload: impl Into<Value>) -> Result<PublishReport, BusError> {
        self.publish(&Message::new(kind, payload), ANY_ORIGIN)
    }

    pub async fn run(&self) {
        let mut inbox = self.inner.inbox.lock().await;
        while let Some(event) = inbox.recv().await {
            self.dispatch(&event);
        }
        debug!(frame = %self.frame_id(), "bus inbox closed");
    }

    /// Dispatches everything already queued, including messages published by
    /// handlers during this drain. Returns the number of events processed, or
    /// zero while [`Bus::run`] owns the inbox.
    pub fn dispatch_pending(&self) -> usize {
        let Ok(mut inbox) = self.inner.inbox.try_lock() else {
            return 0;
        };
        let mut processed = 0;
        while let Ok(event) = inbox.try_recv() {
            self.dispatch(&event);
            processed += 1;
        }
        processed
    }

    fn dispatch(&self, event: &MessageEvent) {
        let Some(message) = Message::from_value(&event.data) else {
            trace!(frame = %self.frame_id(), source = %event.source, "dropping malformed message");
            return;
        };

        let handlers = self
            .listeners()
            .get(&message.kind)
            .cloned()
            .unwrap_or_default();

        for handler in handlers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                (handler.0)(&message.payload, event)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    debug!(frame = %self.frame_id(), kind = %message.kind, %error, "bus handler failed");
                }
                Err(_) => {
                    warn!(frame = %self.frame_id(), kind = %message.kind, "bus handler panicked");
                }
            }
        }
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<String, Vec<Handler>>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
