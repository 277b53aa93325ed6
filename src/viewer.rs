// viewer.rs — top-level owner: wires model, scheduler, input, cache, markers and loader
//
// Everything runs on the host's frame thread. The host feeds `handle_input` with events as
// they arrive and calls `tick` once per frame; the viewer calls the render backend exactly
// once per tick.

use crate::animation::{AnimationScheduler, MotionKind, Transition, ViewTarget};
use crate::backend::RenderBackend;
use crate::cache::TextureCache;
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::events::{EventEmitter, EventSink, ViewerEvent};
use crate::input::{InputController, InputMessage, InputOutcome, InputState};
use crate::loader::{LoadRequest, LoadedPanorama, PanoramaLoader};
use crate::markers::{MarkerDescriptor, MarkerSet};
use crate::projector::{hit_test, project_markers, Camera, MarkerProjection, PanoData, Viewport};
use crate::task::{TaskHandle, TaskOutcome};
use crate::view::{CameraParams, OrientationModel, ViewState};
use std::time::Duration;

/// What one tick produced, for the host to draw overlays with.
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera: CameraParams,
    pub view: ViewState,
    pub markers: Vec<MarkerProjection>,
    pub input: InputState,
}

struct PendingLoad<P> {
    source: String,
    generation: u64,
    position: Option<(f64, f64)>,
    handle: TaskHandle,
    /// Set on a cache hit: applied on the next tick without asking the loader.
    cached: Option<LoadedPanorama<P>>,
}

pub struct Viewer<L: PanoramaLoader> {
    config: ViewerConfig,
    model: OrientationModel,
    scheduler: AnimationScheduler,
    input: InputController,
    cache: TextureCache<LoadedPanorama<L::Payload>>,
    markers: MarkerSet,
    events: EventEmitter,
    loader: L,
    pano_data: Option<PanoData>,
    displayed: Option<String>,
    generation: u64,
    pending: Option<PendingLoad<L::Payload>>,
    last_view: Option<ViewState>,
    autorotating: bool,
    ready: bool,
    now: Duration,
    next_task_id: u64,
}

impl<L: PanoramaLoader> Viewer<L> {
    /// Normalizes `config`, registers its markers and requests its initial panorama.
    pub fn new(config: ViewerConfig, loader: L, viewport: Viewport) -> Result<Self, ViewerError> {
        let config = config.normalized();
        let mut markers = MarkerSet::new();
        for descriptor in &config.markers {
            markers.add(descriptor.clone())?;
        }

        let mut viewer = Self {
            model: OrientationModel::new(&config),
            scheduler: AnimationScheduler::new(),
            input: InputController::new(&config, viewport),
            cache: TextureCache::new(config.cache_capacity),
            markers,
            events: EventEmitter::new(),
            loader,
            pano_data: None,
            displayed: None,
            generation: 0,
            pending: None,
            last_view: None,
            autorotating: false,
            ready: false,
            now: Duration::ZERO,
            next_task_id: 0,
            config,
        };
        if let Some(source) = viewer.config.panorama.clone() {
            viewer.set_panorama(source, None);
        }
        Ok(viewer)
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn view(&self) -> ViewState {
        self.model.state()
    }

    pub fn viewport(&self) -> Viewport {
        self.input.viewport()
    }

    pub fn input_state(&self) -> InputState {
        self.input.state(&self.scheduler)
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_autorotating(&self) -> bool {
        self.scheduler.active_kind() == Some(MotionKind::Autorotate)
    }

    pub fn device_orientation_enabled(&self) -> bool {
        self.input.device_orientation_enabled()
    }

    pub fn displayed_panorama(&self) -> Option<&str> {
        self.displayed.as_deref()
    }

    pub fn pano_data(&self) -> Option<PanoData> {
        self.pano_data
    }

    pub fn cache(&self) -> &TextureCache<LoadedPanorama<L::Payload>> {
        &self.cache
    }

    pub fn markers(&self) -> &MarkerSet {
        &self.markers
    }

    pub fn loader_mut(&mut self) -> &mut L {
        &mut self.loader
    }

    /// Register listeners here; the queue is drained by the host.
    pub fn events_mut(&mut self) -> &mut EventEmitter {
        &mut self.events
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        self.events.drain()
    }

    fn next_id(&mut self) -> u64 {
        self.next_task_id += 1;
        self.next_task_id
    }

    fn completed(&mut self) -> TaskHandle {
        let id = self.next_id();
        TaskHandle::resolved(id, TaskOutcome::Completed)
    }

    fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.config.transition_duration_ms)
    }

    // ---- orientation ----

    pub fn set_position(&mut self, longitude: f64, latitude: f64, animated: bool) -> Result<TaskHandle, ViewerError> {
        let target = ViewTarget::position(longitude, latitude);
        if animated {
            return self.animate(target, self.transition_duration());
        }
        self.scheduler.cancel(&mut self.events);
        self.model.set_position(longitude, latitude);
        Ok(self.completed())
    }

    pub fn set_zoom_level(&mut self, level: f64, animated: bool) -> Result<TaskHandle, ViewerError> {
        if animated {
            return self.animate(ViewTarget::zoom(level), self.transition_duration());
        }
        self.scheduler.cancel(&mut self.events);
        self.model.set_zoom(level);
        Ok(self.completed())
    }

    pub fn animate(&mut self, target: ViewTarget, duration: Duration) -> Result<TaskHandle, ViewerError> {
        self.start_transition(Transition::to(target).duration(duration))
    }

    /// Full control over easing and callbacks.
    pub fn start_transition(&mut self, transition: Transition) -> Result<TaskHandle, ViewerError> {
        self.scheduler
            .start(transition, self.now, &self.model, &mut self.events)
    }

    pub fn start_autorotate(&mut self) -> TaskHandle {
        self.input
            .start_autorotate(self.now, &mut self.scheduler, &mut self.events)
    }

    pub fn stop_autorotate(&mut self) -> bool {
        self.input.stop_autorotate(&mut self.scheduler, &mut self.events)
    }

    pub fn toggle_autorotate(&mut self) {
        if self.is_autorotating() {
            self.stop_autorotate();
        } else {
            self.start_autorotate();
        }
    }

    /// Returns false when gyroscope input is disabled in the configuration.
    pub fn set_device_orientation(&mut self, enabled: bool) -> bool {
        self.input
            .set_device_orientation(enabled, &mut self.scheduler, &mut self.events)
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.handle_input(InputMessage::Resize { width, height }, self.now);
    }

    // ---- markers ----

    pub fn add_marker(&mut self, descriptor: MarkerDescriptor) -> Result<(), ViewerError> {
        self.markers.add(descriptor)?;
        Ok(())
    }

    pub fn remove_marker(&mut self, id: &str) -> Result<(), ViewerError> {
        self.markers.remove(id)?;
        Ok(())
    }

    pub fn update_marker(&mut self, id: &str, patch: &MarkerDescriptor) -> Result<(), ViewerError> {
        self.markers.update(id, patch)?;
        Ok(())
    }

    pub fn clear_markers(&mut self) {
        self.markers.clear();
    }

    /// Projection of every marker for the current view.
    pub fn project_markers(&self) -> Vec<MarkerProjection> {
        project_markers(
            &self.model.state(),
            self.viewport(),
            self.pano_data.as_ref(),
            &self.markers,
        )
    }

    // ---- input ----

    pub fn handle_input(&mut self, msg: InputMessage, now: Duration) {
        self.now = self.now.max(now);
        let outcome = self.input.handle(
            msg,
            now,
            &mut self.model,
            &mut self.scheduler,
            &mut self.events,
        );
        if let Some(InputOutcome::Click { x, y }) = outcome {
            self.resolve_click(x, y);
        }
    }

    fn resolve_click(&mut self, x: f64, y: f64) {
        let projections = self.project_markers();
        if let Some(id) = hit_test(&projections, x, y) {
            self.events.emit(ViewerEvent::MarkerSelected { id: id.to_string() });
            return;
        }
        let camera = Camera::new(&self.model.state(), self.viewport());
        let (longitude, latitude) = camera.unproject(x, y);
        let (texture_x, texture_y) = self
            .pano_data
            .map(|p| p.spherical_to_texture(longitude, latitude))
            .unwrap_or((0.0, 0.0));
        self.events.emit(ViewerEvent::Click {
            x,
            y,
            longitude,
            latitude,
            texture_x,
            texture_y,
        });
    }

    // ---- panorama ----

    /// Switch panorama. The handle completes once it is displayed, resolves cancelled when a
    /// newer request supersedes it or `cancel()` is called before it shows, and fails when
    /// loading fails.
    pub fn set_panorama(&mut self, source: impl Into<String>, position: Option<(f64, f64)>) -> TaskHandle {
        let source = source.into();
        self.generation += 1;
        if let Some(old) = self.pending.take() {
            log::debug!("load of {} superseded by {source}", old.source);
            old.handle.resolve(TaskOutcome::Cancelled);
        }

        let id = self.next_id();
        let handle = TaskHandle::new(id);
        let cached = self.cache.get(&source);
        if cached.is_none() {
            self.loader.request(LoadRequest {
                source: source.clone(),
                generation: self.generation,
            });
        } else {
            log::debug!("{source} served from cache");
        }
        self.pending = Some(PendingLoad {
            source,
            generation: self.generation,
            position,
            handle: handle.clone(),
            cached,
        });
        handle
    }

    fn poll_loads<B: RenderBackend<L::Payload>>(&mut self, backend: &mut B) {
        // a cancelled request turns every later completion for it into a stale one
        if self.pending.as_ref().map_or(false, |p| p.handle.cancel_requested()) {
            if let Some(pending) = self.pending.take() {
                log::debug!("load of {} cancelled", pending.source);
                pending.handle.resolve(TaskOutcome::Cancelled);
            }
        }

        while let Some(done) = self.loader.poll() {
            let current = self
                .pending
                .as_ref()
                .map_or(false, |p| p.generation == done.generation && p.source == done.source);
            if !current {
                log::debug!("discarding stale load of {} (generation {})", done.source, done.generation);
                continue;
            }
            let Some(pending) = self.pending.take() else {
                continue;
            };
            match done.result {
                Ok(panorama) => {
                    for key in self.cache.put(pending.source.clone(), panorama.clone()) {
                        log::debug!("evicted {key} from the panorama cache");
                    }
                    self.apply_panorama(pending, panorama, backend);
                }
                Err(err) => {
                    log::warn!("{err}");
                    self.events.emit(ViewerEvent::LoadFailed {
                        source: pending.source,
                        reason: err.to_string(),
                    });
                    pending.handle.resolve(TaskOutcome::Failed(err.to_string()));
                }
            }
        }

        if self.pending.as_ref().map_or(false, |p| p.cached.is_some()) {
            if let Some(mut pending) = self.pending.take() {
                if let Some(panorama) = pending.cached.take() {
                    self.apply_panorama(pending, panorama, backend);
                }
            }
        }
    }

    fn apply_panorama<B: RenderBackend<L::Payload>>(
        &mut self,
        pending: PendingLoad<L::Payload>,
        panorama: LoadedPanorama<L::Payload>,
        backend: &mut B,
    ) {
        for key in self.cache.set_displayed(Some(&pending.source)) {
            log::debug!("evicted {key} from the panorama cache");
        }
        let geometry = self
            .config
            .pano_data
            .filter(PanoData::is_valid)
            .unwrap_or_else(|| PanoData::for_image(panorama.width, panorama.height));
        backend.show_panorama(&panorama, &geometry);
        self.pano_data = Some(geometry);
        log::info!(
            "showing {} ({}x{})",
            pending.source,
            panorama.width,
            panorama.height
        );
        self.displayed = Some(pending.source.clone());
        self.events.emit(ViewerEvent::PanoramaLoaded {
            source: pending.source,
        });

        if let Some((longitude, latitude)) = pending.position {
            let animated = self.config.transition_duration_ms > 0;
            if let Err(err) = self.set_position(longitude, latitude, animated) {
                log::warn!("cannot move to the new panorama's position: {err}");
            }
        }
        pending.handle.resolve(TaskOutcome::Completed);
    }

    // ---- frame ----

    /// Advance one frame: apply finished loads, run automatic motion, emit state changes and
    /// hand the camera to `backend`.
    pub fn tick<B: RenderBackend<L::Payload>>(&mut self, now: Duration, backend: &mut B) -> Frame {
        self.now = self.now.max(now);
        self.poll_loads(backend);

        if self.ready {
            self.input
                .poll_idle(now, &mut self.scheduler, &mut self.events);
        }
        self.scheduler.tick(now, &mut self.model, &mut self.events);

        let view = self.model.state();
        let last = self.last_view.replace(view);
        if last.map_or(true, |l| l.longitude != view.longitude || l.latitude != view.latitude) {
            self.events.emit(ViewerEvent::PositionUpdated {
                longitude: view.longitude,
                latitude: view.latitude,
            });
        }
        if last.map_or(true, |l| l.zoom_level != view.zoom_level) {
            self.events.emit(ViewerEvent::ZoomUpdated {
                zoom_level: view.zoom_level,
                fov: view.fov,
            });
        }
        let autorotating = self.is_autorotating();
        if autorotating != self.autorotating {
            self.autorotating = autorotating;
            self.events.emit(ViewerEvent::AutorotateChanged {
                active: autorotating,
            });
        }

        let camera = self.model.camera(self.viewport().aspect());
        backend.update_camera(&camera);

        if !self.ready && self.displayed.is_some() {
            self.ready = true;
            self.events.emit(ViewerEvent::Ready);
        }

        Frame {
            camera,
            view,
            markers: self.project_markers(),
            input: self.input_state(),
        }
    }
}

impl<L: PanoramaLoader> std::fmt::Debug for Viewer<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("view", &self.model.state())
            .field("displayed", &self.displayed)
            .field("generation", &self.generation)
            .field("markers", &self.markers.len())
            .field("ready", &self.ready)
            .finish()
    }
}
