use std::time::Duration;

/// Fixed capture raster. Independent of the source resolution so payload
/// size and encode latency stay predictable.
pub const CAPTURE_WIDTH: u32 = 320;
pub const CAPTURE_HEIGHT: u32 = 240;
pub const CAPTURE_JPEG_QUALITY: u8 = 100;
pub const CAPTURE_MIME_TYPE: &str = "image/jpeg";

pub const IMAGE_FIELD_NAME: &str = "image";
pub const UPLOAD_FILE_NAME: &str = "captured_image.jpg";

pub const REGISTER_PATH: &str = "/identity/register";
pub const VERIFY_PATH: &str = "/identity/verify";
pub const ANALYZE_PATH: &str = "/analyze";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_RECOGNITION_MODEL: &str = "Facenet";
pub const DEFAULT_DETECTOR_BACKEND: &str = "opencv";
pub const DEFAULT_DISTANCE_METRIC: &str = "cosine";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
