// backend.rs — hook the viewer drives once per tick

use crate::loader::LoadedPanorama;
use crate::projector::PanoData;
use crate::view::CameraParams;

pub trait RenderBackend<P> {
    /// A new panorama became the displayed one. `geometry` places the image on the sphere.
    fn show_panorama(&mut self, panorama: &LoadedPanorama<P>, geometry: &PanoData);

    /// Called exactly once per tick with the camera to draw the next frame with.
    fn update_camera(&mut self, camera: &CameraParams);
}

/// Backend that draws nothing, for headless use.
#[derive(Debug, Default, Clone)]
pub struct NullBackend {
    pub frames: u64,
    pub last_camera: Option<CameraParams>,
    pub panoramas_shown: u64,
    pub last_geometry: Option<PanoData>,
}

impl<P> RenderBackend<P> for NullBackend {
    fn show_panorama(&mut self, _panorama: &LoadedPanorama<P>, geometry: &PanoData) {
        self.panoramas_shown += 1;
        self.last_geometry = Some(*geometry);
    }

    fn update_camera(&mut self, camera: &CameraParams) {
        self.frames += 1;
        self.last_camera = Some(*camera);
    }
}
