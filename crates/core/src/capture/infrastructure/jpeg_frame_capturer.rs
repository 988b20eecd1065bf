use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::captured_image::CapturedImage;
use crate::capture::domain::frame_capturer::FrameCapturer;
use crate::capture::domain::video_source::VideoSource;
use crate::shared::constants::{
    CAPTURE_HEIGHT, CAPTURE_JPEG_QUALITY, CAPTURE_MIME_TYPE, CAPTURE_WIDTH,
};
use crate::shared::frame::Frame;

/// Snapshots a [`VideoSource`] and encodes the frame as JPEG using the
/// `image` crate.
///
/// The whole source frame is stretched onto the target raster; the source
/// aspect ratio is not preserved.
pub struct JpegFrameCapturer {
    source: Arc<dyn VideoSource>,
    width: u32,
    height: u32,
    quality: u8,
}

impl JpegFrameCapturer {
    pub fn new(source: Arc<dyn VideoSource>) -> Self {
        Self {
            source,
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
            quality: CAPTURE_JPEG_QUALITY,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    fn encode(&self, frame: Frame) -> Result<CapturedImage, CaptureError> {
        if frame.channels() != 3 {
            return Err(CaptureError::Encode(format!(
                "expected RGB frame, got {} channels",
                frame.channels()
            )));
        }
        let (src_w, src_h) = (frame.width(), frame.height());
        let img = image::RgbImage::from_raw(src_w, src_h, frame.into_data()).ok_or_else(|| {
            CaptureError::Encode("frame data does not match its dimensions".to_string())
        })?;

        let raster = if (src_w, src_h) == (self.width, self.height) {
            img
        } else {
            image::imageops::resize(&img, self.width, self.height, FilterType::Triangle)
        };

        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
        raster
            .write_with_encoder(encoder)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;

        log::debug!(
            "Captured {src_w}x{src_h} frame as {}x{} JPEG ({} bytes)",
            self.width,
            self.height,
            bytes.len()
        );
        Ok(CapturedImage::new(
            bytes,
            self.width,
            self.height,
            CAPTURE_MIME_TYPE,
        ))
    }
}

impl FrameCapturer for JpegFrameCapturer {
    fn capture(&mut self) -> Result<CapturedImage, CaptureError> {
        let frame = self.source.current_frame().ok_or(CaptureError::Unavailable)?;
        self.encode(frame)
    }
}
