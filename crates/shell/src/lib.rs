use anyhow::{Context, Result};
use bus::{Bus, Frame, TargetOrigin};
use shared::domain::ScreenName;
use status_client::StatusStream;
use tracing::info;
use url::Url;

pub mod config;
pub mod controller;
pub mod message_log;
pub mod screens;

pub use config::{load_settings, Settings};
pub use controller::{FrameViewport, ScreenController, Viewport};
pub use message_log::{render_payload, LogEntry, MessageLog};
pub use screens::ScreenMap;

pub const VIEW_FRAME: &str = "background";

pub struct Shell {
    top: Frame,
    view: Frame,
    bus: Bus,
    controller: ScreenController,
    log: MessageLog,
}

impl Shell {
    pub fn build(settings: &Settings) -> Result<Self> {
        Self::with_log(settings, MessageLog::new(settings.log_viewport_rows))
    }

    pub fn with_log(settings: &Settings, log: MessageLog) -> Result<Self> {
        let location = Url::parse(&settings.shell_url)
            .with_context(|| format!("invalid shell url '{}'", settings.shell_url))?;
        TargetOrigin::parse(&settings.target_origin)?;
        let screens = settings.screen_map()?;

        let top = Frame::top_level(location);
        let view = top
            .append_child(VIEW_FRAME, "about:blank")
            .context("failed to create view frame")?;
        let bus = Bus::attach(&top);

        let controller = ScreenController::new(bus.clone(), screens, FrameViewport::new(view.clone()))
            .with_target_origin(settings.target_origin.clone());
        controller.attach()?;
        log.attach(&bus)?;

        Ok(Self {
            top,
            view,
            bus,
            controller,
            log,
        })
    }

    pub fn start(&self) -> Result<ScreenName> {
        self.controller.start()
    }

    pub fn connect(&self, stream: &StatusStream) -> Result<()> {
        let controller = self.controller.clone();
        stream.listen(move |text| {
            controller.handle_status(text);
        })?;
        info!(url = stream.url(), event = stream.event_name(), "listening for status events");
        Ok(())
    }

    pub async fn run(&self) {
        self.bus.run().await;
    }

    pub fn top(&self) -> &Frame {
        &self.top
    }

    pub fn view(&self) -> &Frame {
        &self.view
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn controller(&self) -> &ScreenController {
        &self.controller
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }
}
