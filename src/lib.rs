// lib.rs — 360° panorama viewport engine: orientation, animation, input, cache and markers
//
// The engine is single-threaded and frame-driven. A host owns a `Viewer`, forwards its window
// events as `InputMessage`s and calls `Viewer::tick` once per frame with a `RenderBackend`.

pub mod animation;
pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod loader;
pub mod markers;
pub mod projector;
pub mod task;
pub mod view;
pub mod viewer;

pub use animation::{AnimationScheduler, Easing, MotionKind, Transition, ViewTarget};
pub use backend::{NullBackend, RenderBackend};
pub use cache::TextureCache;
pub use config::{Angle, Speed, ViewerConfig};
pub use error::{ConfigError, LoadError, MarkerError, ViewerError};
pub use events::{EventEmitter, EventKind, EventSink, ListenerId, ViewerEvent};
pub use input::{InputController, InputMessage, InputState, Key};
pub use loader::{LoadCompletion, LoadRequest, LoadedPanorama, PanoramaLoader, ThreadedImageLoader};
pub use markers::{Marker, MarkerDescriptor, MarkerSet, MarkerShape};
pub use projector::{MarkerProjection, PanoData, ProjectedShape, ScreenPoint, Viewport};
pub use task::{TaskHandle, TaskOutcome};
pub use view::{CameraParams, OrientationModel, ViewState};
pub use viewer::{Frame, Viewer};
