// input.rs — pointer / touch / wheel / keyboard / device-orientation state machine
//
// Every host event arrives as an `InputMessage`. Manual input cancels automatic motion
// synchronously, before the scheduler gets to run for the tick.

use crate::animation::{AnimationScheduler, MotionKind};
use crate::config::ViewerConfig;
use crate::events::{EventSink, ViewerEvent};
use crate::projector::Viewport;
use crate::task::TaskHandle;
use crate::view::OrientationModel;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Keyboard step, radians.
const KEY_MOVE_STEP: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    PageUp,
    PageDown,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputMessage {
    PointerDown { x: f64, y: f64 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    TouchStart { id: u64, x: f64, y: f64 },
    TouchMove { id: u64, x: f64, y: f64 },
    TouchEnd { id: u64, x: f64, y: f64 },
    /// Positive zooms in.
    Wheel { delta: f64 },
    Key(Key),
    /// Device heading and pitch, radians.
    DeviceOrientation { heading: f64, pitch: f64 },
    Fullscreen(bool),
    Focus(bool),
    Resize { width: f64, height: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Dragging,
    Pinching,
    Autorotating,
    Animating,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputOutcome {
    /// Pointer released without moving past the threshold.
    Click { x: f64, y: f64 },
}

/// Trailing window of pointer samples `(t_ms, x, y)` used for the release velocity.
#[derive(Debug, Clone)]
pub struct MouseHistory {
    window_ms: f64,
    samples: VecDeque<(f64, f64, f64)>,
}

impl MouseHistory {
    pub fn new(window_ms: f64) -> Self {
        Self {
            window_ms,
            samples: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn push(&mut self, t_ms: f64, x: f64, y: f64) {
        self.samples.push_back((t_ms, x, y));
        while let Some(&(t, _, _)) = self.samples.front() {
            if t < t_ms - self.window_ms {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        // a pause inside the window invalidates everything before it
        let max_gap = self.window_ms / 10.0;
        let mut cut = 0;
        for i in 1..self.samples.len() {
            if self.samples[i].0 - self.samples[i - 1].0 > max_gap {
                cut = i;
            }
        }
        self.samples.drain(..cut);
    }

    /// Average velocity (px/ms) from the oldest retained sample to the newest.
    pub fn velocity(&self) -> Option<(f64, f64)> {
        let (t0, x0, y0) = *self.samples.front()?;
        let (t1, x1, y1) = *self.samples.back()?;
        let dt = t1 - t0;
        if dt <= 0.0 {
            return None;
        }
        Some(((x1 - x0) / dt, (y1 - y0) / dt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct InputSettings {
    move_speed: f64,
    mousemove: bool,
    mousewheel: bool,
    keyboard: bool,
    gyroscope: bool,
    move_threshold_px: f64,
    inertia_enabled: bool,
    inertia_min_speed: f64,
    inertia_duration: Duration,
    pinch_zoom_factor: f64,
    autorotate_delay: Option<Duration>,
    autorotate_speed: f64,
    autorotate_latitude: f64,
}

impl InputSettings {
    fn from_config(config: &ViewerConfig) -> Self {
        Self {
            move_speed: config.move_speed,
            mousemove: config.mousemove,
            mousewheel: config.mousewheel,
            keyboard: config.keyboard,
            gyroscope: config.gyroscope,
            move_threshold_px: config.move_threshold_px,
            inertia_enabled: config.inertia_enabled,
            inertia_min_speed: config.inertia_min_speed,
            inertia_duration: Duration::from_millis(config.inertia_duration_ms),
            pinch_zoom_factor: config.pinch_zoom_factor,
            autorotate_delay: config.autorotate_delay_ms.map(Duration::from_millis),
            autorotate_speed: config.autorotate_speed.0,
            autorotate_latitude: config
                .autorotate_latitude
                .unwrap_or(config.default_latitude)
                .0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Idle,
    Dragging {
        start: (f64, f64),
        last: (f64, f64),
        touch: Option<u64>,
    },
    Pinching {
        distance: f64,
    },
}

fn millis(t: Duration) -> f64 {
    t.as_secs_f64() * 1000.0
}

#[derive(Debug, Clone)]
pub struct InputController {
    settings: InputSettings,
    mode: Mode,
    history: MouseHistory,
    touches: BTreeMap<u64, (f64, f64)>,
    viewport: Viewport,
    fullscreen: bool,
    focused: bool,
    device_orientation: bool,
    auto_resume: bool,
    idle_since: Option<Duration>,
}

impl InputController {
    pub fn new(config: &ViewerConfig, viewport: Viewport) -> Self {
        let settings = InputSettings::from_config(config);
        Self {
            settings,
            mode: Mode::Idle,
            history: MouseHistory::new(config.inertia_window_ms),
            touches: BTreeMap::new(),
            viewport,
            fullscreen: false,
            focused: true,
            device_orientation: false,
            auto_resume: settings.autorotate_delay.is_some(),
            idle_since: None,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn state(&self, scheduler: &AnimationScheduler) -> InputState {
        match self.mode {
            Mode::Dragging { .. } => InputState::Dragging,
            Mode::Pinching { .. } => InputState::Pinching,
            Mode::Idle => match scheduler.active_kind() {
                Some(MotionKind::Autorotate) => InputState::Autorotating,
                Some(_) => InputState::Animating,
                None => InputState::Idle,
            },
        }
    }

    pub fn device_orientation_enabled(&self) -> bool {
        self.device_orientation
    }

    pub fn keyboard_active(&self) -> bool {
        self.settings.keyboard && self.fullscreen && self.focused
    }

    /// Radians per pixel (horizontal, vertical), so a drag keeps the content under the cursor
    /// at `move_speed` 1.
    pub fn move_rates(&self, model: &OrientationModel) -> (f64, f64) {
        let vp = self.viewport;
        let h = model.horizontal_fov(vp.aspect()).to_radians() / vp.width;
        let v = model.fov().to_radians() / vp.height;
        (h * self.settings.move_speed, v * self.settings.move_speed)
    }

    pub fn handle(
        &mut self,
        msg: InputMessage,
        now: Duration,
        model: &mut OrientationModel,
        scheduler: &mut AnimationScheduler,
        events: &mut dyn EventSink,
    ) -> Option<InputOutcome> {
        match msg {
            InputMessage::PointerDown { x, y } => {
                self.begin_drag(x, y, None, now, scheduler, events);
                None
            }
            InputMessage::PointerMove { x, y } => {
                self.drag_to(x, y, None, now, model);
                None
            }
            InputMessage::PointerUp { x, y } => self.end_drag(x, y, now, model, scheduler, events),
            InputMessage::TouchStart { id, x, y } => {
                self.touches.insert(id, (x, y));
                match self.touches.len() {
                    1 => self.begin_drag(x, y, Some(id), now, scheduler, events),
                    2 => {
                        scheduler.cancel(events);
                        self.history.clear();
                        self.mode = Mode::Pinching {
                            distance: self.pinch_distance().unwrap_or(0.0),
                        };
                        self.idle_since = None;
                    }
                    _ => {}
                }
                None
            }
            InputMessage::TouchMove { id, x, y } => {
                if let Some(p) = self.touches.get_mut(&id) {
                    *p = (x, y);
                }
                match self.mode {
                    Mode::Dragging { .. } => self.drag_to(x, y, Some(id), now, model),
                    Mode::Pinching { distance } => {
                        if let Some(d) = self.pinch_distance() {
                            let delta = self.settings.pinch_zoom_factor * (d - distance) / self.viewport.width;
                            model.set_zoom(f64::from(model.zoom_level()) + delta);
                            self.mode = Mode::Pinching { distance: d };
                        }
                    }
                    Mode::Idle => {}
                }
                None
            }
            InputMessage::TouchEnd { id, x, y } => {
                self.touches.remove(&id);
                match self.mode {
                    Mode::Dragging { touch: Some(t), .. } if t == id => {
                        self.end_drag(x, y, now, model, scheduler, events)
                    }
                    Mode::Pinching { .. } => {
                        self.mode = Mode::Idle;
                        self.idle_since = Some(now);
                        None
                    }
                    _ => None,
                }
            }
            InputMessage::Wheel { delta } => {
                if self.settings.mousewheel && delta != 0.0 && delta.is_finite() {
                    scheduler.cancel(events);
                    model.set_zoom(f64::from(model.zoom_level()) + delta.signum());
                    self.restart_idle_timer(now);
                }
                None
            }
            InputMessage::Key(key) => {
                if self.keyboard_active() {
                    scheduler.cancel(events);
                    match key {
                        Key::ArrowUp => {
                            model.rotate_by(0.0, KEY_MOVE_STEP);
                        }
                        Key::ArrowDown => {
                            model.rotate_by(0.0, -KEY_MOVE_STEP);
                        }
                        Key::ArrowRight => {
                            model.rotate_by(KEY_MOVE_STEP, 0.0);
                        }
                        Key::ArrowLeft => {
                            model.rotate_by(-KEY_MOVE_STEP, 0.0);
                        }
                        Key::PageUp | Key::Plus => {
                            model.zoom_in();
                        }
                        Key::PageDown | Key::Minus => {
                            model.zoom_out();
                        }
                    }
                    self.restart_idle_timer(now);
                }
                None
            }
            InputMessage::DeviceOrientation { heading, pitch } => {
                // may arrive after tracking was switched off
                if self.device_orientation && !matches!(self.mode, Mode::Dragging { .. }) {
                    model.set_position(heading, pitch);
                }
                None
            }
            InputMessage::Fullscreen(on) => {
                self.fullscreen = on;
                None
            }
            InputMessage::Focus(on) => {
                self.focused = on;
                None
            }
            InputMessage::Resize { width, height } => {
                self.viewport = Viewport::new(width, height);
                None
            }
        }
    }

    fn restart_idle_timer(&mut self, now: Duration) {
        if self.mode == Mode::Idle {
            self.idle_since = Some(now);
        }
    }

    fn pinch_distance(&self) -> Option<f64> {
        let mut it = self.touches.values();
        let (a, b) = (it.next()?, it.next()?);
        Some((a.0 - b.0).hypot(a.1 - b.1))
    }

    fn begin_drag(
        &mut self,
        x: f64,
        y: f64,
        touch: Option<u64>,
        now: Duration,
        scheduler: &mut AnimationScheduler,
        events: &mut dyn EventSink,
    ) {
        if !self.settings.mousemove {
            return;
        }
        scheduler.cancel(events);
        if self.device_orientation {
            self.device_orientation = false;
            events.emit(ViewerEvent::DeviceOrientationChanged { enabled: false });
        }
        self.history.clear();
        self.history.push(millis(now), x, y);
        self.mode = Mode::Dragging {
            start: (x, y),
            last: (x, y),
            touch,
        };
        self.idle_since = None;
    }

    fn drag_to(&mut self, x: f64, y: f64, touch: Option<u64>, now: Duration, model: &mut OrientationModel) {
        let Mode::Dragging { start, last, touch: t } = self.mode else {
            return;
        };
        if t != touch {
            return;
        }
        let (rx, ry) = self.move_rates(model);
        model.rotate_by(-(x - last.0) * rx, (y - last.1) * ry);
        self.history.push(millis(now), x, y);
        self.mode = Mode::Dragging {
            start,
            last: (x, y),
            touch: t,
        };
    }

    fn end_drag(
        &mut self,
        x: f64,
        y: f64,
        now: Duration,
        model: &mut OrientationModel,
        scheduler: &mut AnimationScheduler,
        events: &mut dyn EventSink,
    ) -> Option<InputOutcome> {
        let Mode::Dragging { start, .. } = self.mode else {
            return None;
        };
        self.mode = Mode::Idle;
        self.idle_since = Some(now);

        let threshold = self.settings.move_threshold_px;
        let outcome = if (x - start.0).abs() < threshold && (y - start.1).abs() < threshold {
            Some(InputOutcome::Click { x, y })
        } else {
            if self.settings.inertia_enabled {
                self.history.push(millis(now), x, y);
                if let Some((vx, vy)) = self.history.velocity() {
                    if vx.hypot(vy) >= self.settings.inertia_min_speed {
                        let rates = self.move_rates(model);
                        scheduler.start_inertia(
                            (vx, vy),
                            rates,
                            self.settings.inertia_duration,
                            now,
                            model,
                            events,
                        );
                    }
                }
            }
            None
        };
        self.history.clear();
        outcome
    }

    /// Switch device-orientation tracking. Refused when gyroscope input is not allowed.
    pub fn set_device_orientation(
        &mut self,
        enabled: bool,
        scheduler: &mut AnimationScheduler,
        events: &mut dyn EventSink,
    ) -> bool {
        if enabled && !self.settings.gyroscope {
            return false;
        }
        if enabled == self.device_orientation {
            return true;
        }
        if enabled {
            scheduler.cancel_automatic(events);
        }
        self.device_orientation = enabled;
        events.emit(ViewerEvent::DeviceOrientationChanged { enabled });
        true
    }

    pub fn start_autorotate(
        &mut self,
        now: Duration,
        scheduler: &mut AnimationScheduler,
        events: &mut dyn EventSink,
    ) -> TaskHandle {
        self.auto_resume = self.settings.autorotate_delay.is_some();
        scheduler.start_autorotate(
            self.settings.autorotate_speed,
            self.settings.autorotate_latitude,
            now,
            events,
        )
    }

    /// Explicit stop: also suppresses the idle restart until autorotate is started again.
    pub fn stop_autorotate(&mut self, scheduler: &mut AnimationScheduler, events: &mut dyn EventSink) -> bool {
        self.auto_resume = false;
        if scheduler.active_kind() == Some(MotionKind::Autorotate) {
            scheduler.cancel(events);
            true
        } else {
            false
        }
    }

    /// Start autorotation once idle for the configured delay. Returns true when it started.
    pub fn poll_idle(
        &mut self,
        now: Duration,
        scheduler: &mut AnimationScheduler,
        events: &mut dyn EventSink,
    ) -> bool {
        let Some(delay) = self.settings.autorotate_delay else {
            return false;
        };
        if !self.auto_resume || self.device_orientation || self.mode != Mode::Idle || scheduler.is_active() {
            if scheduler.is_active() || self.mode != Mode::Idle {
                self.idle_since = None;
            }
            return false;
        }
        let since = *self.idle_since.get_or_insert(now);
        if now.saturating_sub(since) < delay {
            return false;
        }
        self.idle_since = None;
        self.start_autorotate(now, scheduler, events);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskOutcome;

    struct Rig {
        input: InputController,
        model: OrientationModel,
        sched: AnimationScheduler,
        events: Vec<ViewerEvent>,
    }

    impl Rig {
        fn new(config: ViewerConfig) -> Self {
            let config = config.normalized();
            Self {
                input: InputController::new(&config, Viewport::new(1000.0, 500.0)),
                model: OrientationModel::new(&config),
                sched: AnimationScheduler::new(),
                events: Vec::new(),
            }
        }

        fn send(&mut self, msg: InputMessage, t_ms: u64) -> Option<InputOutcome> {
            self.input.handle(
                msg,
                Duration::from_millis(t_ms),
                &mut self.model,
                &mut self.sched,
                &mut self.events,
            )
        }
    }

    #[test]
    fn history_prunes_old_samples_and_gaps() {
        let mut h = MouseHistory::new(300.0);
        h.push(0.0, 0.0, 0.0);
        h.push(10.0, 1.0, 0.0);
        h.push(400.0, 2.0, 0.0);
        assert_eq!(h.len(), 1);

        let mut h = MouseHistory::new(300.0);
        h.push(0.0, 0.0, 0.0);
        h.push(100.0, 5.0, 0.0); // gap of 100 > 30
        h.push(110.0, 10.0, 0.0);
        assert_eq!(h.len(), 2);
        let (vx, _) = h.velocity().unwrap();
        assert!((vx - 0.5).abs() < 1e-12);
    }

    #[test]
    fn short_press_is_a_click() {
        let mut rig = Rig::new(ViewerConfig::default());
        rig.send(InputMessage::PointerDown { x: 100.0, y: 100.0 }, 0);
        rig.send(InputMessage::PointerMove { x: 102.0, y: 101.0 }, 10);
        let out = rig.send(InputMessage::PointerUp { x: 102.0, y: 101.0 }, 20);
        assert_eq!(out, Some(InputOutcome::Click { x: 102.0, y: 101.0 }));
        assert!(!rig.sched.is_active());
    }

    #[test]
    fn drag_moves_view_and_release_starts_inertia() {
        let mut rig = Rig::new(ViewerConfig::default());
        let lon0 = rig.model.longitude();
        rig.send(InputMessage::PointerDown { x: 500.0, y: 250.0 }, 0);
        assert_eq!(rig.input.state(&rig.sched), InputState::Dragging);
        for i in 1..=5u64 {
            rig.send(InputMessage::PointerMove { x: 500.0 + 20.0 * i as f64, y: 250.0 }, i * 16);
        }
        // dragging right turns the view left
        assert!(crate::view::shortest_delta(lon0, rig.model.longitude()) < 0.0);
        let out = rig.send(InputMessage::PointerUp { x: 600.0, y: 250.0 }, 80);
        assert_eq!(out, None);
        assert_eq!(rig.sched.active_kind(), Some(MotionKind::Inertia));
        assert_eq!(rig.input.state(&rig.sched), InputState::Animating);
    }

    #[test]
    fn slow_release_has_no_inertia() {
        let mut rig = Rig::new(ViewerConfig::default());
        rig.send(InputMessage::PointerDown { x: 500.0, y: 250.0 }, 0);
        rig.send(InputMessage::PointerMove { x: 510.0, y: 250.0 }, 100);
        // held still before release: the pause empties the velocity window
        rig.send(InputMessage::PointerUp { x: 510.0, y: 250.0 }, 200);
        assert!(!rig.sched.is_active());
        assert_eq!(rig.input.state(&rig.sched), InputState::Idle);
    }

    #[test]
    fn pointer_down_cancels_autorotate() {
        let mut rig = Rig::new(ViewerConfig::default());
        let h = rig
            .input
            .start_autorotate(Duration::ZERO, &mut rig.sched, &mut rig.events);
        assert_eq!(rig.input.state(&rig.sched), InputState::Autorotating);
        rig.send(InputMessage::PointerDown { x: 1.0, y: 1.0 }, 5);
        assert_eq!(h.outcome(), Some(TaskOutcome::Cancelled));
        assert_eq!(rig.input.state(&rig.sched), InputState::Dragging);
    }

    #[test]
    fn pinch_changes_zoom() {
        let mut rig = Rig::new(ViewerConfig::default());
        let z0 = rig.model.zoom_level();
        rig.send(InputMessage::TouchStart { id: 1, x: 400.0, y: 250.0 }, 0);
        rig.send(InputMessage::TouchStart { id: 2, x: 600.0, y: 250.0 }, 1);
        assert_eq!(rig.input.state(&rig.sched), InputState::Pinching);
        // spread by 100 px on a 1000 px viewport: +8 levels
        rig.send(InputMessage::TouchMove { id: 2, x: 700.0, y: 250.0 }, 16);
        assert_eq!(rig.model.zoom_level(), z0 + 8);
        rig.send(InputMessage::TouchEnd { id: 2, x: 700.0, y: 250.0 }, 32);
        assert_eq!(rig.input.state(&rig.sched), InputState::Idle);
    }

    #[test]
    fn wheel_steps_zoom_by_one() {
        let mut rig = Rig::new(ViewerConfig::default());
        let z0 = rig.model.zoom_level();
        rig.send(InputMessage::Wheel { delta: 3.5 }, 0);
        assert_eq!(rig.model.zoom_level(), z0 + 1);
        rig.send(InputMessage::Wheel { delta: -0.2 }, 0);
        assert_eq!(rig.model.zoom_level(), z0);
    }

    #[test]
    fn keyboard_requires_fullscreen() {
        let mut rig = Rig::new(ViewerConfig::default());
        rig.send(InputMessage::Key(Key::ArrowUp), 0);
        assert_eq!(rig.model.latitude(), 0.0);
        rig.send(InputMessage::Fullscreen(true), 0);
        rig.send(InputMessage::Key(Key::ArrowUp), 0);
        assert!((rig.model.latitude() - KEY_MOVE_STEP).abs() < 1e-12);
        let z0 = rig.model.zoom_level();
        rig.send(InputMessage::Key(Key::Plus), 0);
        assert_eq!(rig.model.zoom_level(), z0 + 1);
    }

    #[test]
    fn device_orientation_tracks_until_drag() {
        let mut rig = Rig::new(ViewerConfig {
            gyroscope: true,
            ..ViewerConfig::default()
        });
        assert!(rig.input.set_device_orientation(true, &mut rig.sched, &mut rig.events));
        rig.send(InputMessage::DeviceOrientation { heading: 1.0, pitch: 0.2 }, 0);
        assert!((rig.model.longitude() - 1.0).abs() < 1e-12);

        rig.send(InputMessage::PointerDown { x: 0.0, y: 0.0 }, 10);
        assert!(!rig.input.device_orientation_enabled());
        rig.send(InputMessage::PointerUp { x: 0.0, y: 0.0 }, 20);
        rig.send(InputMessage::DeviceOrientation { heading: 2.0, pitch: 0.2 }, 30);
        assert!((rig.model.longitude() - 1.0).abs() < 1e-12);
        assert!(rig
            .events
            .contains(&ViewerEvent::DeviceOrientationChanged { enabled: false }));
    }

    #[test]
    fn gyroscope_disabled_refuses_tracking() {
        let mut rig = Rig::new(ViewerConfig::default());
        assert!(!rig.input.set_device_orientation(true, &mut rig.sched, &mut rig.events));
    }

    #[test]
    fn idle_timer_starts_autorotate_after_delay() {
        let mut rig = Rig::new(ViewerConfig {
            autorotate_delay_ms: Some(1000),
            ..ViewerConfig::default()
        });
        let t = Duration::from_millis;
        assert!(!rig.input.poll_idle(t(0), &mut rig.sched, &mut rig.events));
        assert!(!rig.input.poll_idle(t(999), &mut rig.sched, &mut rig.events));
        assert!(rig.input.poll_idle(t(1000), &mut rig.sched, &mut rig.events));
        assert_eq!(rig.sched.active_kind(), Some(MotionKind::Autorotate));

        assert!(rig.input.stop_autorotate(&mut rig.sched, &mut rig.events));
        assert!(!rig.input.poll_idle(t(5000), &mut rig.sched, &mut rig.events));
    }
}
