use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    Camera, NokhwaError,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera {index}: {source}")]
    Open { index: u32, source: NokhwaError },
    #[error("failed to open camera stream: {0}")]
    Stream(NokhwaError),
}

/// Anything that can hand out the current video frame.
pub trait FrameSource {
    /// `None` whenever no frame is available right now.
    fn grab(&mut self) -> Option<DynamicImage>;
}

/// A downscaled JPEG snapshot ready for transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedFrame {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }

    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.to_base64())
    }
}

/// Grabs a frame, shrinks it to a fixed raster and JPEG-encodes it.
pub struct FrameSampler<S> {
    source: S,
    width: u32,
    height: u32,
    quality: u8,
    surface: Option<Vec<u8>>,
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: S, width: u32, height: u32, quality: u8) -> Self {
        Self {
            source,
            width: width.max(1),
            height: height.max(1),
            quality: quality.clamp(1, 100),
            surface: None,
        }
    }

    pub fn capture(&mut self) -> Option<EncodedFrame> {
        let img = self.source.grab()?;
        let rgb = img
            .resize_exact(self.width, self.height, FilterType::Triangle)
            .into_rgb8();

        let (width, height) = (self.width, self.height);
        let surface = self
            .surface
            .get_or_insert_with(|| Vec::with_capacity(surface_capacity(width, height)));
        surface.clear();
        if let Err(e) = JpegEncoder::new_with_quality(&mut *surface, self.quality).encode_image(&rgb)
        {
            error!("failed to encode frame: {e}");
            return None;
        }
        trace!(bytes = surface.len(), width, height, "frame sampled");
        Some(EncodedFrame {
            jpeg: surface.clone(),
            width,
            height,
        })
    }
}

const MAX_SURFACE_HINT: usize = 1 << 20;

/// Initial encode buffer size; JPEG output is far smaller than the raster.
fn surface_capacity(width: u32, height: u32) -> usize {
    ((width as usize).saturating_mul(height as usize) / 4).min(MAX_SURFACE_HINT)
}

/// Live camera. Opens lazily and keeps retrying until the device answers.
pub struct CameraSource {
    index: u32,
    width: u32,
    height: u32,
    camera: Option<Camera>,
    failures: u32,
}

impl CameraSource {
    pub fn new(index: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            camera: None,
            failures: 0,
        }
    }

    fn open(&self) -> Result<Camera, CaptureError> {
        let index = CameraIndex::Index(self.index);
        let mut cam = None;
        for fmt in [FrameFormat::MJPEG, FrameFormat::YUYV, FrameFormat::RAWRGB] {
            let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
                CameraFormat::new_from(self.width, self.height, fmt, 30),
            ));
            if let Ok(c) = Camera::new(index.clone(), req) {
                cam = Some(c);
                break;
            }
        }
        let mut cam = match cam {
            Some(c) => c,
            None => {
                let req = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
                Camera::new(index, req).map_err(|source| CaptureError::Open {
                    index: self.index,
                    source,
                })?
            }
        };
        cam.open_stream().map_err(CaptureError::Stream)?;
        debug!(format = ?cam.camera_format(), "camera stream opened");
        Ok(cam)
    }
}

impl FrameSource for CameraSource {
    fn grab(&mut self) -> Option<DynamicImage> {
        if self.camera.is_none() {
            match self.open() {
                Ok(c) => {
                    self.camera = Some(c);
                    self.failures = 0;
                }
                Err(e) => {
                    if self.failures == 0 {
                        warn!("camera not ready: {e}");
                    } else {
                        debug!(attempt = self.failures + 1, "camera not ready: {e}");
                    }
                    self.failures += 1;
                    return None;
                }
            }
        }
        let cam = self.camera.as_mut()?;
        let frame = match cam.frame() {
            Ok(f) => f,
            Err(e) => {
                error!("failed to capture frame: {e}");
                return None;
            }
        };
        match frame.decode_image::<RgbFormat>() {
            Ok(i) => Some(DynamicImage::ImageRgb8(i)),
            Err(e) => {
                error!("failed to decode frame: {e}");
                None
            }
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Some(cam) = self.camera.as_mut() {
            if let Err(e) = cam.stop_stream() {
                debug!("failed to stop camera stream: {e}");
            }
        }
    }
}

fn load_frames(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => {
            let mut paths: Vec<PathBuf> = rd
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            paths.sort();
            if paths.is_empty() {
                error!("no frames found in {}", dir.display());
            }
            paths
        }
        Err(e) => {
            error!("failed to read {}: {e}", dir.display());
            Vec::new()
        }
    }
}

/// Replays the images of a directory in name order, looping forever.
pub struct DirectorySource {
    frames: Vec<PathBuf>,
    index: usize,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> Self {
        Self {
            frames: load_frames(dir),
            index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn next_path(&mut self) -> Option<PathBuf> {
        if self.frames.is_empty() {
            return None;
        }
        let path = self.frames[self.index % self.frames.len()].clone();
        self.index = (self.index + 1) % self.frames.len();
        Some(path)
    }
}

impl FrameSource for DirectorySource {
    fn grab(&mut self) -> Option<DynamicImage> {
        let path = self.next_path()?;
        match image::open(&path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!(path = %path.display(), "skipping unreadable frame: {e}");
                None
            }
        }
    }
}

/// Single still image, handy for one-off classification.
pub struct StillSource(pub Option<DynamicImage>);

impl FrameSource for StillSource {
    fn grab(&mut self) -> Option<DynamicImage> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn checker(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([240, 240, 240])
            } else {
                Rgb([20, 60, 20])
            }
        }))
    }

    #[test]
    fn capture_without_frame_is_none() {
        let mut sampler = FrameSampler::new(StillSource(None), 240, 180, 60);
        assert!(sampler.capture().is_none());
    }

    #[test]
    fn capture_downscales_to_fixed_raster() {
        let mut sampler = FrameSampler::new(StillSource(Some(checker(640, 480))), 240, 180, 60);
        let frame = sampler.capture().unwrap();
        assert_eq!((frame.width, frame.height), (240, 180));
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&frame.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (240, 180));
    }

    #[test]
    fn surface_capacity_handles_huge_rasters() {
        assert_eq!(surface_capacity(240, 180), 240 * 180 / 4);
        assert_eq!(surface_capacity(u32::MAX, u32::MAX), MAX_SURFACE_HINT);
        assert_eq!(surface_capacity(70_000, 70_000), MAX_SURFACE_HINT);
    }

    #[test]
    fn data_url_carries_jpeg_prefix() {
        let frame = EncodedFrame {
            jpeg: vec![0xFF, 0xD8, 0xFF],
            width: 1,
            height: 1,
        };
        assert_eq!(frame.to_base64(), "/9j/");
        assert_eq!(frame.data_url(), "data:image/jpeg;base64,/9j/");
    }

    #[test]
    fn directory_source_cycles_in_name_order() {
        let dir = tempdir().unwrap();
        checker(32, 16).save(dir.path().join("b.png")).unwrap();
        checker(16, 32).save(dir.path().join("a.png")).unwrap();
        let mut src = DirectorySource::new(dir.path());
        assert_eq!(src.len(), 2);
        let sizes: Vec<_> = (0..3)
            .map(|_| {
                let img = src.grab().unwrap();
                (img.width(), img.height())
            })
            .collect();
        assert_eq!(sizes, vec![(16, 32), (32, 16), (16, 32)]);
    }

    #[test]
    fn directory_source_skips_unreadable_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("junk.jpg"), b"not an image").unwrap();
        let mut src = DirectorySource::new(dir.path());
        assert!(src.grab().is_none());
    }

    #[test]
    fn empty_directory_yields_nothing() {
        let dir = tempdir().unwrap();
        let mut src = DirectorySource::new(dir.path());
        assert!(src.is_empty());
        assert!(src.grab().is_none());
    }
}
