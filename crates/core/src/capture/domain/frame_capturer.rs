use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::captured_image::CapturedImage;

/// Turns the current video frame into an encoded still.
///
/// Every call yields a freshly allocated payload.
pub trait FrameCapturer: Send {
    fn capture(&mut self) -> Result<CapturedImage, CaptureError>;
}
