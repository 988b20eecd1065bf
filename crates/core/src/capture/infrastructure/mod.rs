pub mod ffmpeg_live_feed;
pub mod jpeg_frame_capturer;
pub mod still_image_source;
