use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::{Context, Result};
use bus::{Bus, Frame, Handler, ANY_ORIGIN};
use shared::{
    domain::{DisplayState, ScreenName},
    error::BusError,
    protocol::{screen_directive, Message, STATUS},
};
use tracing::{debug, info, warn};

use crate::screens::ScreenMap;

pub trait Viewport: Send + Sync {
    fn show(&self, screen: &ScreenName, resource: &str) -> Result<()>;
}

pub struct FrameViewport {
    frame: Frame,
}

impl FrameViewport {
    pub fn new(frame: Frame) -> Self {
        Self { frame }
    }
}

impl Viewport for FrameViewport {
    fn show(&self, screen: &ScreenName, resource: &str) -> Result<()> {
        let location = self
            .frame
            .navigate(resource)
            .with_context(|| format!("cannot load '{resource}' for screen {screen}"))?;
        debug!(frame = %self.frame.id(), %location, "viewport loaded");
        Ok(())
    }
}

#[derive(Clone)]
pub struct ScreenController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    bus: Bus,
    screens: ScreenMap,
    viewport: Box<dyn Viewport>,
    target_origin: String,
    state: Mutex<DisplayState>,
}

impl ScreenController {
    pub fn new(bus: Bus, screens: ScreenMap, viewport: impl Viewport + 'static) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                bus,
                screens,
                viewport: Box::new(viewport),
                target_origin: ANY_ORIGIN.to_string(),
                state: Mutex::new(DisplayState::Uninitialized),
            }),
        }
    }

    /// Origin filter for everything this controller publishes. Only takes
    /// effect before the controller has been cloned or attached.
    pub fn with_target_origin(mut self, target_origin: impl Into<String>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.target_origin = target_origin.into(),
            None => warn!("target origin ignored: controller is already shared"),
        }
        self
    }

    pub fn display_state(&self) -> DisplayState {
        self.inner.state().clone()
    }

    pub fn current_screen(&self) -> Option<ScreenName> {
        self.inner.state().screen().cloned()
    }

    pub fn start(&self) -> Result<ScreenName> {
        let initial = self.inner.screens.initial().clone();
        let (screen, resource) = self
            .inner
            .screens
            .resolve(initial.as_str())
            .with_context(|| format!("initial screen {initial} is not configured"))?;
        {
            let mut state = self.inner.state();
            self.inner.viewport.show(&screen, resource)?;
            *state = DisplayState::Showing(screen.clone());
        }
        info!(screen = %screen, "screen controller started");
        Ok(screen)
    }

    pub fn handle_status(&self, text: &str) -> Option<ScreenName> {
        debug!(status = text, "status event");
        if let Err(error) = self.publish(&Message::status(text)) {
            warn!(%error, "failed to republish status event");
        }
        self.apply_directive(text)
    }

    pub fn apply_directive(&self, text: &str) -> Option<ScreenName> {
        let candidate = screen_directive(text)?;
        let Some((screen, resource)) = self.inner.screens.resolve(candidate) else {
            debug!(candidate, "ignoring unknown screen directive");
            return None;
        };

        {
            // Held across `show` so the state always names the rendered screen.
            let mut state = self.inner.state();
            if let Err(error) = self.inner.viewport.show(&screen, resource) {
                warn!(screen = %screen, error = %format!("{error:#}"), "viewport refused screen change");
                return None;
            }
            *state = DisplayState::Showing(screen.clone());
        }
        info!(screen = %screen, resource, "screen changed");

        if let Err(error) = self.publish(&Message::screen_changed(&screen)) {
            warn!(%error, "failed to announce screen change");
        }
        Some(screen)
    }

    pub fn attach(&self) -> Result<Handler, BusError> {
        let controller = Arc::downgrade(&self.inner);
        let own_frame = self.inner.bus.frame_id();
        let handler = Handler::new(move |payload, event| {
            if event.source == own_frame {
                return Ok(());
            }
            let (Some(inner), Some(text)) = (Weak::upgrade(&controller), payload.as_str()) else {
                return Ok(());
            };
            ScreenController { inner }.apply_directive(text);
            Ok(())
        });
        self.inner.bus.subscribe(STATUS, handler.clone())?;
        Ok(handler)
    }

    fn publish(&self, message: &Message) -> Result<(), BusError> {
        self.inner
            .bus
            .publish(message, &self.inner.target_origin)
            .map(|_| ())
    }
}

impl ControllerInner {
    fn state(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
