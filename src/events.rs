// events.rs — typed viewer events, listener registry and the emit-only sink seen by components

use crate::animation::MotionKind;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    PositionUpdated { longitude: f64, latitude: f64 },
    ZoomUpdated { zoom_level: u8, fov: f64 },
    AnimationStarted { id: u64, kind: MotionKind },
    AnimationCancelled { id: u64, kind: MotionKind },
    AnimationCompleted { id: u64, kind: MotionKind },
    AutorotateChanged { active: bool },
    DeviceOrientationChanged { enabled: bool },
    /// Click on the panorama that hit no marker.
    Click {
        x: f64,
        y: f64,
        longitude: f64,
        latitude: f64,
        texture_x: f64,
        texture_y: f64,
    },
    MarkerSelected { id: String },
    PanoramaLoaded { source: String },
    LoadFailed { source: String, reason: String },
    /// First tick that rendered a panorama.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PositionUpdated,
    ZoomUpdated,
    AnimationStarted,
    AnimationCancelled,
    AnimationCompleted,
    AutorotateChanged,
    DeviceOrientationChanged,
    Click,
    MarkerSelected,
    PanoramaLoaded,
    LoadFailed,
    Ready,
}

impl ViewerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ViewerEvent::PositionUpdated { .. } => EventKind::PositionUpdated,
            ViewerEvent::ZoomUpdated { .. } => EventKind::ZoomUpdated,
            ViewerEvent::AnimationStarted { .. } => EventKind::AnimationStarted,
            ViewerEvent::AnimationCancelled { .. } => EventKind::AnimationCancelled,
            ViewerEvent::AnimationCompleted { .. } => EventKind::AnimationCompleted,
            ViewerEvent::AutorotateChanged { .. } => EventKind::AutorotateChanged,
            ViewerEvent::DeviceOrientationChanged { .. } => EventKind::DeviceOrientationChanged,
            ViewerEvent::Click { .. } => EventKind::Click,
            ViewerEvent::MarkerSelected { .. } => EventKind::MarkerSelected,
            ViewerEvent::PanoramaLoaded { .. } => EventKind::PanoramaLoaded,
            ViewerEvent::LoadFailed { .. } => EventKind::LoadFailed,
            ViewerEvent::Ready => EventKind::Ready,
        }
    }
}

/// What internal components get: they can emit, never subscribe.
pub trait EventSink {
    fn emit(&mut self, event: ViewerEvent);
}

impl EventSink for Vec<ViewerEvent> {
    fn emit(&mut self, event: ViewerEvent) {
        self.push(event);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ViewerEvent)>;

/// Listeners are invoked synchronously on emit; every event is also queued for `drain`.
#[derive(Default)]
pub struct EventEmitter {
    next_id: u64,
    listeners: Vec<(ListenerId, Option<EventKind>, Listener)>,
    queue: Vec<ViewerEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&ViewerEvent) + 'static) -> ListenerId {
        self.register(Some(kind), Box::new(listener))
    }

    pub fn on_any(&mut self, listener: impl FnMut(&ViewerEvent) + 'static) -> ListenerId {
        self.register(None, Box::new(listener))
    }

    fn register(&mut self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, kind, listener));
        id
    }

    /// Returns false when the id was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn pending(&self) -> &[ViewerEvent] {
        &self.queue
    }

    pub fn drain(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.queue)
    }
}

impl EventSink for EventEmitter {
    fn emit(&mut self, event: ViewerEvent) {
        let kind = event.kind();
        for (_, filter, listener) in self.listeners.iter_mut() {
            if filter.map_or(true, |k| k == kind) {
                listener(&event);
            }
        }
        self.queue.push(event);
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}
