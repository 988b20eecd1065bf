pub mod capture_error;
pub mod captured_image;
pub mod frame_capturer;
pub mod video_source;
