// animation.rs — frame-driven animation scheduler with a single active slot
//
// The host calls `tick(now)` once per frame. Starting any motion cancels the running one:
// its handle resolves as Cancelled and its on_cancel runs before the new motion is installed.

use crate::error::ViewerError;
use crate::events::{EventSink, ViewerEvent};
use crate::task::{TaskHandle, TaskOutcome};
use crate::view::{OrientationModel, ViewState};
use std::f64::consts::PI;
use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy)]
pub enum Easing {
    Linear,
    InQuad,
    OutQuad,
    InOutQuad,
    InCubic,
    OutCubic,
    InOutCubic,
    InSine,
    OutSine,
    InOutSine,
    InCirc,
    OutCirc,
    InOutCirc,
    Custom(fn(f64) -> f64),
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::InQuad => t * t,
            Easing::OutQuad => t * (2.0 - t),
            Easing::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
            Easing::InCubic => t * t * t,
            Easing::OutCubic => {
                let u = t - 1.0;
                u * u * u + 1.0
            }
            Easing::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    (t - 1.0) * (2.0 * t - 2.0) * (2.0 * t - 2.0) + 1.0
                }
            }
            Easing::InSine => 1.0 - (t * PI / 2.0).cos(),
            Easing::OutSine => (t * PI / 2.0).sin(),
            Easing::InOutSine => 0.5 - (t * PI).cos() / 2.0,
            Easing::InCirc => 1.0 - (1.0 - t * t).sqrt(),
            Easing::OutCirc => (1.0 - (t - 1.0) * (t - 1.0)).sqrt(),
            Easing::InOutCirc => {
                if t < 0.5 {
                    (1.0 - (1.0 - 4.0 * t * t).sqrt()) / 2.0
                } else {
                    (1.0 + (1.0 - (2.0 * t - 2.0) * (2.0 * t - 2.0)).sqrt()) / 2.0
                }
            }
            Easing::Custom(f) => f(t),
        }
    }
}

impl fmt::Debug for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Easing::Custom(_) => write!(f, "Custom"),
            Easing::Linear => write!(f, "Linear"),
            Easing::InQuad => write!(f, "InQuad"),
            Easing::OutQuad => write!(f, "OutQuad"),
            Easing::InOutQuad => write!(f, "InOutQuad"),
            Easing::InCubic => write!(f, "InCubic"),
            Easing::OutCubic => write!(f, "OutCubic"),
            Easing::InOutCubic => write!(f, "InOutCubic"),
            Easing::InSine => write!(f, "InSine"),
            Easing::OutSine => write!(f, "OutSine"),
            Easing::InOutSine => write!(f, "InOutSine"),
            Easing::InCirc => write!(f, "InCirc"),
            Easing::OutCirc => write!(f, "OutCirc"),
            Easing::InOutCirc => write!(f, "InOutCirc"),
        }
    }
}

/// Any subset of the view fields; missing fields keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewTarget {
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub zoom_level: Option<f64>,
}

impl ViewTarget {
    pub fn position(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude: Some(longitude),
            latitude: Some(latitude),
            zoom_level: None,
        }
    }

    pub fn zoom(level: f64) -> Self {
        Self {
            zoom_level: Some(level),
            ..Self::default()
        }
    }

    pub fn with_zoom(mut self, level: f64) -> Self {
        self.zoom_level = Some(level);
        self
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        for (name, v) in [
            ("longitude", self.longitude),
            ("latitude", self.latitude),
            ("zoom_level", self.zoom_level),
        ] {
            if let Some(v) = v {
                if !v.is_finite() {
                    return Err(ViewerError::InvalidTarget(format!("{name} = {v}")));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionKind {
    Transition,
    Inertia,
    Autorotate,
}

type TickCallback = Box<dyn FnMut(&ViewState)>;
type DoneCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct Callbacks {
    on_tick: Option<TickCallback>,
    on_complete: Option<DoneCallback>,
    on_cancel: Option<DoneCallback>,
}

/// A programmatic move/zoom request.
pub struct Transition {
    target: ViewTarget,
    duration: Duration,
    easing: Easing,
    callbacks: Callbacks,
}

impl Transition {
    pub fn to(target: ViewTarget) -> Self {
        Self {
            target,
            duration: Duration::from_millis(1000),
            easing: Easing::InOutSine,
            callbacks: Callbacks::default(),
        }
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    pub fn on_tick(mut self, f: impl FnMut(&ViewState) + 'static) -> Self {
        self.callbacks.on_tick = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.callbacks.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + 'static) -> Self {
        self.callbacks.on_cancel = Some(Box::new(f));
        self
    }
}

enum Motion {
    Transition {
        from: ViewState,
        target: ViewTarget,
        duration: Duration,
        easing: Easing,
    },
    /// Pointer velocity (px/ms) decaying linearly to zero over `duration`.
    Inertia {
        from: ViewState,
        velocity: (f64, f64),
        rates: (f64, f64),
        duration: Duration,
    },
    /// Endless longitude advance; latitude converges toward `latitude` at the same rate.
    Autorotate {
        speed: f64,
        latitude: f64,
        last: Duration,
    },
}

impl Motion {
    fn kind(&self) -> MotionKind {
        match self {
            Motion::Transition { .. } => MotionKind::Transition,
            Motion::Inertia { .. } => MotionKind::Inertia,
            Motion::Autorotate { .. } => MotionKind::Autorotate,
        }
    }
}

struct ActiveAnimation {
    id: u64,
    motion: Motion,
    start: Duration,
    handle: TaskHandle,
    callbacks: Callbacks,
}

fn progress(now: Duration, start: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 1.0;
    }
    (now.saturating_sub(start).as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
}

#[derive(Default)]
pub struct AnimationScheduler {
    next_id: u64,
    active: Option<ActiveAnimation>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_kind(&self) -> Option<MotionKind> {
        self.active.as_ref().map(|a| a.motion.kind())
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Validate `transition` and make it the active animation. Rejected targets leave the
    /// running animation untouched.
    pub fn start(
        &mut self,
        transition: Transition,
        now: Duration,
        model: &OrientationModel,
        events: &mut dyn EventSink,
    ) -> Result<TaskHandle, ViewerError> {
        transition.target.validate()?;
        let motion = Motion::Transition {
            from: model.state(),
            target: transition.target,
            duration: transition.duration,
            easing: transition.easing,
        };
        Ok(self.install(motion, transition.callbacks, now, events))
    }

    /// `velocity` in px/ms, `rates` converts pixels to radians (longitude, latitude).
    pub fn start_inertia(
        &mut self,
        velocity: (f64, f64),
        rates: (f64, f64),
        duration: Duration,
        now: Duration,
        model: &OrientationModel,
        events: &mut dyn EventSink,
    ) -> TaskHandle {
        let motion = Motion::Inertia {
            from: model.state(),
            velocity,
            rates,
            duration,
        };
        self.install(motion, Callbacks::default(), now, events)
    }

    /// `speed` in rad/s; `latitude` is where autorotation settles vertically.
    pub fn start_autorotate(
        &mut self,
        speed: f64,
        latitude: f64,
        now: Duration,
        events: &mut dyn EventSink,
    ) -> TaskHandle {
        let motion = Motion::Autorotate {
            speed,
            latitude,
            last: now,
        };
        self.install(motion, Callbacks::default(), now, events)
    }

    fn install(
        &mut self,
        motion: Motion,
        callbacks: Callbacks,
        now: Duration,
        events: &mut dyn EventSink,
    ) -> TaskHandle {
        self.cancel(events);

        self.next_id += 1;
        let id = self.next_id;
        let kind = motion.kind();
        let handle = TaskHandle::new(id);
        self.active = Some(ActiveAnimation {
            id,
            motion,
            start: now,
            handle: handle.clone(),
            callbacks,
        });
        log::debug!("animation {id} started ({kind:?})");
        events.emit(ViewerEvent::AnimationStarted { id, kind });
        handle
    }

    /// Cancel the active animation, if any. Returns what was cancelled.
    pub fn cancel(&mut self, events: &mut dyn EventSink) -> Option<MotionKind> {
        let active = self.active.take()?;
        let kind = active.motion.kind();
        active.handle.resolve(TaskOutcome::Cancelled);
        if let Some(f) = active.callbacks.on_cancel {
            f();
        }
        log::debug!("animation {} cancelled ({kind:?})", active.id);
        events.emit(ViewerEvent::AnimationCancelled { id: active.id, kind });
        Some(kind)
    }

    /// Cancel only automatic motion (autorotate, inertia). Programmatic transitions survive.
    pub fn cancel_automatic(&mut self, events: &mut dyn EventSink) -> Option<MotionKind> {
        match self.active_kind() {
            Some(MotionKind::Autorotate) | Some(MotionKind::Inertia) => self.cancel(events),
            _ => None,
        }
    }

    /// Advance the active animation to `now` and write the result into `model`.
    pub fn tick(&mut self, now: Duration, model: &mut OrientationModel, events: &mut dyn EventSink) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.handle.cancel_requested() {
            self.cancel(events);
            return;
        }

        let finished = match &mut active.motion {
            Motion::Transition {
                from,
                target,
                duration,
                easing,
            } => {
                let t = progress(now, active.start, *duration);
                let e = easing.apply(t);
                let lon = target
                    .longitude
                    .map(|to| from.longitude + model.longitude_delta(from.longitude, to) * e);
                let lat = target
                    .latitude
                    .map(|to| from.latitude + (to - from.latitude) * e);
                model.set_position(lon.unwrap_or(f64::NAN), lat.unwrap_or(f64::NAN));
                if let Some(to) = target.zoom_level {
                    let z = f64::from(from.zoom_level);
                    model.set_zoom(z + (to - z) * e);
                }
                t >= 1.0
            }
            Motion::Inertia {
                from,
                velocity,
                rates,
                duration,
            } => {
                let t = progress(now, active.start, *duration);
                let span = duration.as_secs_f64() * 1000.0;
                // integral of the linearly decaying velocity
                let travelled = span * (t - t * t / 2.0);
                let (dx, dy) = (velocity.0 * travelled, velocity.1 * travelled);
                model.set_position(
                    from.longitude - dx * rates.0,
                    from.latitude + dy * rates.1,
                );
                t >= 1.0
            }
            Motion::Autorotate {
                speed,
                latitude,
                last,
            } => {
                let dt = now.saturating_sub(*last).as_secs_f64();
                *last = now;
                let step = speed.abs() * dt;
                let d_lat = (*latitude - model.latitude()).clamp(-step, step);
                model.rotate_by(*speed * dt, d_lat);
                false
            }
        };

        if let Some(f) = active.callbacks.on_tick.as_mut() {
            f(&model.state());
        }

        if finished {
            if let Some(active) = self.active.take() {
                let kind = active.motion.kind();
                active.handle.resolve(TaskOutcome::Completed);
                if let Some(f) = active.callbacks.on_complete {
                    f();
                }
                events.emit(ViewerEvent::AnimationCompleted { id: active.id, kind });
            }
        }
    }
}

impl fmt::Debug for AnimationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationScheduler")
            .field("active", &self.active_kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn model_at(lon_deg: f64) -> OrientationModel {
        let mut m = OrientationModel::new(&ViewerConfig::default().normalized());
        m.set_position(lon_deg.to_radians(), 0.0);
        m
    }

    #[test]
    fn easing_endpoints() {
        for e in [
            Easing::Linear,
            Easing::InOutQuad,
            Easing::OutCubic,
            Easing::InOutSine,
            Easing::OutCirc,
            Easing::InOutCirc,
        ] {
            assert!(e.apply(0.0).abs() < 1e-12, "{e:?}");
            assert!((e.apply(1.0) - 1.0).abs() < 1e-12, "{e:?}");
        }
    }

    #[test]
    fn longitude_takes_the_short_way_round() {
        let mut model = model_at(350.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        sched
            .start(
                Transition::to(ViewTarget::position(10f64.to_radians(), 0.0))
                    .duration(ms(1000))
                    .easing(Easing::Linear),
                ms(0),
                &model,
                &mut events,
            )
            .unwrap();

        sched.tick(ms(500), &mut model, &mut events);
        let lon = model.longitude();
        assert!(lon < 1e-9 || (crate::view::TWO_PI - lon) < 1e-9, "got {lon}");
    }

    #[test]
    fn completes_and_resolves() {
        let mut model = model_at(0.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let done = Rc::new(RefCell::new(false));
        let flag = done.clone();
        let h = sched
            .start(
                Transition::to(ViewTarget::zoom(100.0))
                    .duration(ms(200))
                    .on_complete(move || *flag.borrow_mut() = true),
                ms(0),
                &model,
                &mut events,
            )
            .unwrap();

        sched.tick(ms(100), &mut model, &mut events);
        assert!(!h.is_finished());
        sched.tick(ms(250), &mut model, &mut events);
        assert_eq!(h.outcome(), Some(TaskOutcome::Completed));
        assert!(*done.borrow());
        assert_eq!(model.zoom_level(), 100);
        assert!(!sched.is_active());
        assert!(matches!(events.last(), Some(ViewerEvent::AnimationCompleted { .. })));
    }

    #[test]
    fn zero_duration_finishes_on_first_tick() {
        let mut model = model_at(0.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let h = sched
            .start(
                Transition::to(ViewTarget::position(1.0, 0.5)).duration(Duration::ZERO),
                ms(10),
                &model,
                &mut events,
            )
            .unwrap();
        sched.tick(ms(10), &mut model, &mut events);
        assert_eq!(h.outcome(), Some(TaskOutcome::Completed));
        assert!((model.longitude() - 1.0).abs() < 1e-12);
        assert!((model.latitude() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn second_animation_cancels_first_before_ticking() {
        let mut model = model_at(0.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let order = Rc::new(RefCell::new(Vec::<&'static str>::new()));

        let o1 = order.clone();
        let a = sched
            .start(
                Transition::to(ViewTarget::position(1.0, 0.0))
                    .duration(ms(1000))
                    .on_cancel(move || o1.borrow_mut().push("a cancelled")),
                ms(0),
                &model,
                &mut events,
            )
            .unwrap();
        sched.tick(ms(100), &mut model, &mut events);

        let o2 = order.clone();
        let b = sched
            .start(
                Transition::to(ViewTarget::position(2.0, 0.0))
                    .duration(ms(1000))
                    .on_tick(move |_| o2.borrow_mut().push("b tick")),
                ms(100),
                &model,
                &mut events,
            )
            .unwrap();
        assert_eq!(a.outcome(), Some(TaskOutcome::Cancelled));
        assert!(!b.is_finished());

        sched.tick(ms(200), &mut model, &mut events);
        assert_eq!(*order.borrow(), vec!["a cancelled", "b tick"]);
    }

    #[test]
    fn non_finite_target_is_rejected_synchronously() {
        let model = model_at(0.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let r = sched.start(
            Transition::to(ViewTarget::position(f64::NAN, 0.0)),
            ms(0),
            &model,
            &mut events,
        );
        assert!(matches!(r, Err(ViewerError::InvalidTarget(_))));
        assert!(!sched.is_active());
        assert!(events.is_empty());
    }

    #[test]
    fn handle_cancel_is_honoured_on_next_tick() {
        let mut model = model_at(0.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let h = sched
            .start(Transition::to(ViewTarget::position(1.0, 0.0)), ms(0), &model, &mut events)
            .unwrap();
        h.cancel();
        sched.tick(ms(16), &mut model, &mut events);
        assert_eq!(h.outcome(), Some(TaskOutcome::Cancelled));
        assert_eq!(model.longitude(), 0.0);
    }

    #[test]
    fn autorotate_wraps_and_never_completes() {
        let mut model = model_at(359.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        // one degree per second
        let h = sched.start_autorotate(1f64.to_radians(), 0.0, ms(0), &mut events);
        for i in 1..=20 {
            sched.tick(ms(i * 100), &mut model, &mut events);
        }
        assert!((model.longitude() - 1f64.to_radians()).abs() < 1e-9);
        assert!(!h.is_finished());
        assert_eq!(sched.active_kind(), Some(MotionKind::Autorotate));
        assert_eq!(sched.cancel_automatic(&mut events), Some(MotionKind::Autorotate));
        assert_eq!(h.outcome(), Some(TaskOutcome::Cancelled));
    }

    #[test]
    fn inertia_travels_half_of_velocity_times_duration() {
        let mut model = model_at(180.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let rate = 0.001;
        let h = sched.start_inertia(
            (1.0, 0.0),
            (rate, rate),
            ms(400),
            ms(0),
            &model,
            &mut events,
        );
        sched.tick(ms(400), &mut model, &mut events);
        // 1 px/ms * 400 ms / 2 = 200 px to the right, longitude decreases
        let expected = 180f64.to_radians() - 200.0 * rate;
        assert!((model.longitude() - expected).abs() < 1e-9);
        assert_eq!(h.outcome(), Some(TaskOutcome::Completed));
    }

    #[test]
    fn transition_inside_longitude_range_goes_through_the_allowed_arc() {
        let cfg = ViewerConfig {
            longitude_range: Some([
                crate::config::Angle::degrees(10.0),
                crate::config::Angle::degrees(350.0),
            ]),
            ..ViewerConfig::default()
        }
        .normalized();
        let mut model = OrientationModel::new(&cfg);
        model.set_position(20f64.to_radians(), 0.0);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        sched
            .start(
                Transition::to(ViewTarget::position(340f64.to_radians(), 0.0))
                    .duration(ms(1000))
                    .easing(Easing::Linear),
                ms(0),
                &model,
                &mut events,
            )
            .unwrap();

        let mut previous = model.longitude();
        for i in 1..=10 {
            sched.tick(ms(i * 100), &mut model, &mut events);
            let lon = model.longitude();
            assert!(lon > previous, "tick {i}: {previous} -> {lon}");
            assert!(lon - previous < 33f64.to_radians());
            previous = lon;
        }
        assert!((model.longitude() - 340f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn autorotate_eases_latitude_to_its_target() {
        let mut model = model_at(0.0);
        model.set_position(0.0, 0.5);
        let mut sched = AnimationScheduler::new();
        let mut events: Vec<ViewerEvent> = Vec::new();
        let speed = 1.0;
        sched.start_autorotate(speed, 0.0, ms(0), &mut events);

        let mut previous = model.latitude();
        for i in 1..=10 {
            sched.tick(ms(i * 100), &mut model, &mut events);
            let lat = model.latitude();
            assert!(lat <= previous);
            assert!(previous - lat <= speed * 0.1 + 1e-12);
            previous = lat;
        }
        assert_eq!(model.latitude(), 0.0);
    }
}
