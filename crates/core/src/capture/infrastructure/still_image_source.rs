use std::path::Path;

use crate::capture::domain::video_source::VideoSource;
use crate::shared::frame::Frame;

/// Presents a single picture as a feed that never changes.
///
/// Lets the workflow run headless (scripts, CI, kiosks without a camera)
/// against a photo on disk.
pub struct StillImageSource {
    frame: Frame,
}

impl StillImageSource {
    pub fn open(path: &Path) -> Result<Self, image::ImageError> {
        let img = image::open(path)?.to_rgb8();
        log::info!(
            "Using still image {} ({}x{}) as video source",
            path.display(),
            img.width(),
            img.height()
        );
        Ok(Self::from_rgb(img))
    }

    pub fn from_rgb(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            frame: Frame::new(img.into_raw(), width, height, 3, 0),
        }
    }
}

impl VideoSource for StillImageSource {
    fn current_frame(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}
