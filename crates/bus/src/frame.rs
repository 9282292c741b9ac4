use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
};

use serde_json::Value;
use shared::{
    domain::FrameId,
    error::{BusError, TransportError},
};
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

pub const ANY_ORIGIN: &str = "*";
pub const SAME_ORIGIN: &str = "/";

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub data: Value,
    pub origin: String,
    pub source: FrameId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOrigin {
    Any,
    SameAsSender,
    Exact(String),
}

impl TargetOrigin {
    pub fn parse(raw: &str) -> Result<Self, BusError> {
        match raw {
            ANY_ORIGIN => Ok(Self::Any),
            SAME_ORIGIN => Ok(Self::SameAsSender),
            other => Url::parse(other)
                .map(|url| Self::Exact(url.origin().ascii_serialization()))
                .map_err(|_| BusError::InvalidTargetOrigin(other.to_string())),
        }
    }

    fn admits(&self, sender_origin: &str, target_origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::SameAsSender => sender_origin == target_origin,
            Self::Exact(origin) => origin == target_origin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    Filtered,
    Unobserved,
}

#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

struct FrameInner {
    id: FrameId,
    name: String,
    sandboxed: bool,
    parent: Option<Weak<FrameInner>>,
    state: Mutex<FrameState>,
}

struct FrameState {
    location: Url,
    children: Vec<Frame>,
    document: Option<mpsc::UnboundedSender<MessageEvent>>,
    detached: bool,
}

impl Frame {
    pub fn top_level(location: Url) -> Self {
        Self::create("top", location, false, None)
    }

    fn create(
        name: &str,
        location: Url,
        sandboxed: bool,
        parent: Option<Weak<FrameInner>>,
    ) -> Self {
        Self {
            inner: Arc::new(FrameInner {
                id: FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed)),
                name: name.to_string(),
                sandboxed,
                parent,
                state: Mutex::new(FrameState {
                    location,
                    children: Vec::new(),
                    document: None,
                    detached: false,
                }),
            }),
        }
    }

    pub fn append_child(&self, name: &str, path: &str) -> Result<Frame, url::ParseError> {
        self.append(name, path, false)
    }

    pub fn append_sandboxed_child(&self, name: &str, path: &str) -> Result<Frame, url::ParseError> {
        self.append(name, path, true)
    }

    fn append(&self, name: &str, path: &str, sandboxed: bool) -> Result<Frame, url::ParseError> {
        let location = self.location().join(path)?;
        let child = Self::create(name, location, sandboxed, Some(Arc::downgrade(&self.inner)));
        self.state().children.push(child.clone());
        debug!(parent = %self.id(), child = %child.id(), frame_name = name, "frame attached");
        Ok(child)
    }

    pub fn id(&self) -> FrameId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn location(&self) -> Url {
        self.state().location.clone()
    }

    pub fn origin(&self) -> String {
        self.state().location.origin().ascii_serialization()
    }

    pub fn parent(&self) -> Option<Frame> {
        let parent = self.inner.parent.as_ref()?.upgrade()?;
        if self.is_detached() {
            return None;
        }
        Some(Frame { inner: parent })
    }

    pub fn is_top_level(&self) -> bool {
        self.inner.parent.is_none()
    }

    pub fn is_detached(&self) -> bool {
        self.state().detached
    }

    pub fn children(&self) -> Vec<Frame> {
        self.state().children.clone()
    }

    pub fn child(&self, name: &str) -> Option<Frame> {
        self.state()
            .children
            .iter()
            .find(|child| child.name() == name)
            .cloned()
    }

    pub fn navigate(&self, path: &str) -> Result<Url, url::ParseError> {
        // Relative paths resolve against the embedding document, like iframe `src`.
        let base = match self.parent() {
            Some(parent) => parent.location(),
            None => self.location(),
        };
        let location = base.join(path)?;
        let mut state = self.state();
        state.location = location.clone();
        state.document = None;
        debug!(frame = %self.id(), %location, "frame navigated");
        Ok(location)
    }

    pub fn remove(&self) {
        if let Some(parent) = self.inner.parent.as_ref().and_then(Weak::upgrade) {
            parent
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .children
                .retain(|child| !Arc::ptr_eq(&child.inner, &self.inner));
        }
        self.detach();
    }

    fn detach(&self) {
        let children = {
            let mut state = self.state();
            state.detached = true;
            state.document = None;
            std::mem::take(&mut state.children)
        };
        for child in children {
            child.detach();
        }
        debug!(frame = %self.id(), "frame detached");
    }

    /// A later call replaces the earlier listener.
    pub fn listen(&self) -> mpsc::UnboundedReceiver<MessageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().document = Some(tx);
        rx
    }

    pub fn post_message(
        &self,
        data: &Value,
        target_origin: &TargetOrigin,
        source: &Frame,
    ) -> Result<Delivery, TransportError> {
        let sender_origin = source.origin();
        let same_context = Arc::ptr_eq(&self.inner, &source.inner);
        if self.inner.sandboxed && !same_context {
            return Err(TransportError::AccessDenied { frame: self.id().0 });
        }

        let mut state = self.state();
        if state.detached {
            return Err(TransportError::Detached { frame: self.id().0 });
        }
        let own_origin = state.location.origin().ascii_serialization();
        if !target_origin.admits(&sender_origin, &own_origin) {
            return Ok(Delivery::Filtered);
        }
        let Some(document) = state.document.as_ref() else {
            return Ok(Delivery::Unobserved);
        };

        let event = MessageEvent {
            data: data.clone(),
            origin: sender_origin,
            source: source.id(),
        };
        if document.send(event).is_err() {
            state.document = None;
            return Ok(Delivery::Unobserved);
        }
        Ok(Delivery::Queued)
    }

    fn state(&self) -> MutexGuard<'_, FrameState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("location", &self.location().as_str())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/frame_tests.rs"]
mod tests;
