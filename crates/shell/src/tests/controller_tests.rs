use super::*;
use serde_json::{json, Value};
use shared::protocol::SCREEN_CHANGED;
use url::Url;

#[derive(Clone, Default)]
struct RecordingViewport {
    shown: Arc<Mutex<Vec<(String, String)>>>,
    refuse: bool,
}

impl Viewport for RecordingViewport {
    fn show(&self, screen: &ScreenName, resource: &str) -> Result<()> {
        if self.refuse {
            anyhow::bail!("viewport is gone");
        }
        self.shown
            .lock()
            .expect("lock")
            .push((screen.to_string(), resource.to_string()));
        Ok(())
    }
}

fn top() -> Frame {
    Frame::top_level(Url::parse("http://localhost:8080/").expect("url"))
}

fn spy(bus: &Bus, kind: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(
        kind,
        Handler::new(move |payload, _| {
            sink.lock().expect("lock").push(payload.clone());
            Ok(())
        }),
    )
    .expect("subscribe");
    seen
}

fn setup() -> (Bus, ScreenController, RecordingViewport) {
    let bus = Bus::attach(&top());
    let viewport = RecordingViewport::default();
    let controller = ScreenController::new(bus.clone(), ScreenMap::default(), viewport.clone());
    (bus, controller, viewport)
}

#[test]
fn starts_on_intro_without_announcing() {
    let (bus, controller, viewport) = setup();
    let changed = spy(&bus, SCREEN_CHANGED);
    assert_eq!(controller.display_state(), DisplayState::Uninitialized);

    let screen = controller.start().expect("start");

    assert_eq!(screen.as_str(), "intro");
    assert_eq!(
        controller.display_state(),
        DisplayState::Showing(ScreenName::new("intro"))
    );
    assert_eq!(
        *viewport.shown.lock().expect("lock"),
        vec![("intro".to_string(), "/static/intro.html".to_string())]
    );
    assert_eq!(bus.dispatch_pending(), 0);
    assert!(changed.lock().expect("lock").is_empty());
}

#[test]
fn directive_switches_screen_and_announces_it() {
    let (bus, controller, viewport) = setup();
    let changed = spy(&bus, SCREEN_CHANGED);
    let status = spy(&bus, STATUS);
    controller.start().expect("start");

    let screen = controller.handle_status("screen:alfred");
    bus.dispatch_pending();

    assert_eq!(screen, Some(ScreenName::new("alfred")));
    assert_eq!(controller.current_screen(), Some(ScreenName::new("alfred")));
    assert_eq!(
        viewport.shown.lock().expect("lock").last(),
        Some(&("alfred".to_string(), "/static/alfred.html".to_string()))
    );
    assert_eq!(*changed.lock().expect("lock"), vec![json!("alfred")]);
    assert_eq!(*status.lock().expect("lock"), vec![json!("screen:alfred")]);
}

#[test]
fn surrounding_whitespace_is_trimmed() {
    let (_bus, controller, _viewport) = setup();
    controller.start().expect("start");

    controller.handle_status("screen: tool  ");
    assert_eq!(controller.current_screen(), Some(ScreenName::new("tool")));
}

#[test]
fn text_after_second_colon_is_ignored() {
    let (_bus, controller, _viewport) = setup();
    controller.handle_status("screen:guard:extra");
    assert_eq!(controller.current_screen(), Some(ScreenName::new("guard")));
}

#[test]
fn unknown_screen_is_a_no_op() {
    let (bus, controller, viewport) = setup();
    let changed = spy(&bus, SCREEN_CHANGED);
    let status = spy(&bus, STATUS);
    controller.start().expect("start");

    assert_eq!(controller.handle_status("screen:unknownxyz"), None);
    bus.dispatch_pending();

    assert_eq!(controller.current_screen(), Some(ScreenName::new("intro")));
    assert_eq!(viewport.shown.lock().expect("lock").len(), 1);
    assert!(changed.lock().expect("lock").is_empty());
    assert_eq!(*status.lock().expect("lock"), vec![json!("screen:unknownxyz")]);
}

#[test]
fn plain_status_is_republished_without_transition() {
    let (bus, controller, _viewport) = setup();
    let changed = spy(&bus, SCREEN_CHANGED);
    let status = spy(&bus, STATUS);
    controller.start().expect("start");

    assert_eq!(controller.handle_status("heartbeat"), None);
    assert_eq!(controller.handle_status("tool: gmail"), None);
    bus.dispatch_pending();

    assert_eq!(controller.current_screen(), Some(ScreenName::new("intro")));
    assert!(changed.lock().expect("lock").is_empty());
    assert_eq!(
        *status.lock().expect("lock"),
        vec![json!("heartbeat"), json!("tool: gmail")]
    );
}

#[test]
fn refused_navigation_keeps_display_state() {
    let bus = Bus::attach(&top());
    let changed = spy(&bus, SCREEN_CHANGED);
    let viewport = RecordingViewport {
        refuse: true,
        ..RecordingViewport::default()
    };
    let controller = ScreenController::new(bus.clone(), ScreenMap::default(), viewport);

    assert!(controller.start().is_err());
    assert_eq!(controller.handle_status("screen:guard"), None);
    bus.dispatch_pending();

    assert_eq!(controller.display_state(), DisplayState::Uninitialized);
    assert!(changed.lock().expect("lock").is_empty());
}

#[test]
fn frame_viewport_navigates_the_view_frame() {
    let top = top();
    let view = top.append_child("background", "about:blank").expect("view");
    let bus = Bus::attach(&top);
    let controller =
        ScreenController::new(bus, ScreenMap::default(), FrameViewport::new(view.clone()));

    controller.start().expect("start");
    assert_eq!(view.location().as_str(), "http://localhost:8080/static/intro.html");

    controller.handle_status("screen:guard");
    assert_eq!(view.location().as_str(), "http://localhost:8080/static/guard.html");
}

#[test]
fn status_from_another_frame_can_switch_screens() {
    let top = top();
    let view = top.append_child("background", "/static/intro.html").expect("view");
    let top_bus = Bus::attach(&top);
    let view_bus = Bus::attach(&view);
    let viewport = RecordingViewport::default();
    let controller = ScreenController::new(top_bus.clone(), ScreenMap::default(), viewport.clone());
    controller.attach().expect("attach");
    controller.start().expect("start");

    view_bus.post(STATUS, "screen:tool").expect("publish");
    top_bus.dispatch_pending();

    assert_eq!(controller.current_screen(), Some(ScreenName::new("tool")));
}

#[test]
fn own_status_messages_are_not_applied_twice() {
    let (bus, controller, viewport) = setup();
    controller.attach().expect("attach");

    controller.handle_status("screen:alfred");
    bus.dispatch_pending();

    assert_eq!(viewport.shown.lock().expect("lock").len(), 1);
}

#[test]
fn detached_handler_stops_following_other_frames() {
    let top = top();
    let view = top.append_child("background", "/static/intro.html").expect("view");
    let top_bus = Bus::attach(&top);
    let view_bus = Bus::attach(&view);
    let controller =
        ScreenController::new(top_bus.clone(), ScreenMap::default(), RecordingViewport::default());
    let handler = controller.attach().expect("attach");
    top_bus.unsubscribe(STATUS, &handler);

    view_bus.post(STATUS, "screen:tool").expect("publish");
    top_bus.dispatch_pending();

    assert_eq!(controller.current_screen(), None);
}

#[test]
fn target_origin_applies_to_announcements() {
    let bus = Bus::attach(&top());
    let status = spy(&bus, STATUS);
    let controller = ScreenController::new(bus.clone(), ScreenMap::default(), RecordingViewport::default())
        .with_target_origin("https://elsewhere.example");

    controller.handle_status("heartbeat");
    bus.dispatch_pending();

    assert!(status.lock().expect("lock").is_empty());
}

struct SlowViewport {
    rendered: Arc<Mutex<Option<String>>>,
}

impl Viewport for SlowViewport {
    fn show(&self, screen: &ScreenName, _resource: &str) -> Result<()> {
        *self.rendered.lock().expect("lock") = Some(screen.to_string());
        if screen.as_str() == "alfred" {
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
        Ok(())
    }
}

#[test]
fn concurrent_directives_keep_state_in_step_with_viewport() {
    let rendered = Arc::new(Mutex::new(None));
    let controller = ScreenController::new(
        Bus::attach(&top()),
        ScreenMap::default(),
        SlowViewport {
            rendered: Arc::clone(&rendered),
        },
    );

    let first = controller.clone();
    let slow = std::thread::spawn(move || first.apply_directive("screen:alfred"));
    std::thread::sleep(std::time::Duration::from_millis(50));
    let second = controller.clone();
    let fast = std::thread::spawn(move || second.apply_directive("screen:tool"));
    slow.join().expect("first directive");
    fast.join().expect("second directive");

    let rendered = rendered.lock().expect("lock").clone();
    assert_eq!(
        controller.current_screen().map(|screen| screen.to_string()),
        rendered
    );
    assert_eq!(rendered.as_deref(), Some("tool"));
}
