// loader.rs — panorama loader collaborator and the threaded image decoder behind it
//
// Requests go out tagged with a load generation; completions come back through `poll()` on
// the frame thread, where the viewer drops any that are no longer the latest.

use crate::error::LoadError;
use image::io::Reader as ImageReader;
use image::{GenericImageView, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub source: String,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct LoadedPanorama<P> {
    pub payload: P,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub struct LoadCompletion<P> {
    pub source: String,
    pub generation: u64,
    pub result: Result<LoadedPanorama<P>, LoadError>,
}

pub trait PanoramaLoader {
    type Payload: Clone;

    /// Start loading; must not block the frame thread.
    fn request(&mut self, request: LoadRequest);

    /// Next finished load, if any.
    fn poll(&mut self) -> Option<LoadCompletion<Self::Payload>>;
}

/// Decodes image files on a worker thread per request.
pub struct ThreadedImageLoader {
    tx: Sender<LoadCompletion<Arc<RgbaImage>>>,
    rx: Receiver<LoadCompletion<Arc<RgbaImage>>>,
}

impl Default for ThreadedImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadedImageLoader {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }
}

pub fn decode_image_file(source: &str) -> Result<LoadedPanorama<Arc<RgbaImage>>, LoadError> {
    let file = File::open(source).map_err(|e| LoadError::Open {
        source_id: source.to_string(),
        reason: e.to_string(),
    })?;
    let decode_err = |e: image::ImageError| LoadError::Decode {
        source_id: source.to_string(),
        reason: e.to_string(),
    };

    let mut reader = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    // equirectangular sources routinely exceed the default decoder limits
    reader.no_limits();
    let img = reader.decode().map_err(decode_err)?;

    let (width, height) = img.dimensions();
    log::info!("decoded {source}: {width}x{height}");
    Ok(LoadedPanorama {
        payload: Arc::new(img.to_rgba8()),
        width,
        height,
    })
}

impl PanoramaLoader for ThreadedImageLoader {
    type Payload = Arc<RgbaImage>;

    fn request(&mut self, request: LoadRequest) {
        let tx = self.tx.clone();
        thread::spawn(move || {
            log::debug!("loading {} (generation {})", request.source, request.generation);
            let result = decode_image_file(&request.source);
            let done = LoadCompletion {
                source: request.source,
                generation: request.generation,
                result,
            };
            if tx.send(done).is_err() {
                log::warn!("viewer dropped before the image finished loading");
            }
        });
    }

    fn poll(&mut self) -> Option<LoadCompletion<Self::Payload>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn missing_file_reports_open_error() {
        let err = decode_image_file("/definitely/not/here.jpg").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn threaded_loader_round_trip() {
        let dir = std::env::temp_dir().join(format!("pano_loader_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tiny.png");
        RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let mut loader = ThreadedImageLoader::new();
        loader.request(LoadRequest {
            source: path.display().to_string(),
            generation: 3,
        });

        let deadline = Instant::now() + Duration::from_secs(10);
        let done = loop {
            if let Some(done) = loader.poll() {
                break done;
            }
            assert!(Instant::now() < deadline, "loader timed out");
            std::thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(done.generation, 3);
        let pano = done.result.unwrap();
        assert_eq!((pano.width, pano.height), (4, 2));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
