use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use thiserror::Error;

use crate::capture::domain::video_source::VideoSource;
use crate::shared::frame::Frame;

const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Longest a blocking read on a network or file source may stall before
/// the decode thread gives up, which also bounds how long `stop` waits.
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("ffmpeg initialisation failed: {0}")]
    Init(String),
    #[error("unknown capture input format '{0}'")]
    UnknownFormat(String),
    #[error("failed to open video source {url}: {message}")]
    Open { url: String, message: String },
    #[error("no video stream found in {0}")]
    NoVideoStream(String),
    #[error("failed to spawn video feed thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("video feed thread exited before it was ready")]
    Disconnected,
}

/// Stream properties reported once the source is open.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedInfo {
    pub width: u32,
    pub height: u32,
    pub codec: String,
}

/// Continuously decodes a camera or media URL via ffmpeg-next on a
/// background thread, keeping only the most recent frame as RGB24.
///
/// `input_format` selects a capture device demuxer (`v4l2`, `avfoundation`,
/// `dshow`, ...); `None` lets ffmpeg probe, which is what files and network
/// streams need. When the stream ends the last decoded frame stays current.
/// A stream that stops delivering packets is treated as ended after
/// `STREAM_READ_TIMEOUT`.
pub struct FfmpegLiveFeed {
    latest: Arc<Mutex<Option<Frame>>>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    info: FeedInfo,
}

impl FfmpegLiveFeed {
    /// Opens the source and starts decoding. Returns once the stream is open,
    /// not once a frame has arrived; see [`FfmpegLiveFeed::wait_for_frame`].
    pub fn start(url: &str, input_format: Option<&str>) -> Result<Self, FeedError> {
        let latest = Arc::new(Mutex::new(None));
        let stopped = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<FeedInfo, FeedError>>(1);

        let url_owned = url.to_string();
        let format_owned = input_format.map(str::to_string);
        let latest_clone = latest.clone();
        let stopped_clone = stopped.clone();
        let handle = thread::Builder::new()
            .name("facegate-feed".to_string())
            .spawn(move || {
                run_feed(
                    &url_owned,
                    format_owned.as_deref(),
                    &latest_clone,
                    &stopped_clone,
                    &ready_tx,
                )
            })
            .map_err(FeedError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                log::info!(
                    "Video feed {url} open: {}x{} ({})",
                    info.width,
                    info.height,
                    info.codec
                );
                Ok(Self {
                    latest,
                    stopped,
                    handle: Some(handle),
                    info,
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(FeedError::Disconnected)
            }
        }
    }

    pub fn info(&self) -> &FeedInfo {
        &self.info
    }

    /// Blocks until a first frame is available or `timeout` elapses.
    pub fn wait_for_frame(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.current_frame().is_some() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(FRAME_POLL_INTERVAL);
        }
    }

    /// True while the decode thread is still reading the stream.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Video feed thread panicked");
            }
        }
    }
}

impl Drop for FfmpegLiveFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

impl VideoSource for FfmpegLiveFeed {
    fn current_frame(&self) -> Option<Frame> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct OpenedInput {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    stream_index: usize,
    info: FeedInfo,
}

fn open_input(url: &str, input_format: Option<&str>) -> Result<OpenedInput, FeedError> {
    ffmpeg_next::init().map_err(|e| FeedError::Init(e.to_string()))?;

    let open_err = |e: ffmpeg_next::Error| FeedError::Open {
        url: url.to_string(),
        message: e.to_string(),
    };

    let ictx = match input_format {
        Some(name) => {
            ffmpeg_next::device::register_all();
            let format = ffmpeg_next::device::input::video()
                .find(|f| f.name() == name)
                .ok_or_else(|| FeedError::UnknownFormat(name.to_string()))?;
            ffmpeg_next::format::open_with(
                url,
                &ffmpeg_next::format::Format::Input(format),
                input_options(),
            )
            .map_err(open_err)?
            .input()
        }
        None => ffmpeg_next::format::input_with_dictionary(url, input_options())
            .map_err(open_err)?,
    };

    let stream = ictx
        .streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or_else(|| FeedError::NoVideoStream(url.to_string()))?;
    let stream_index = stream.index();
    let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
        .map_err(open_err)?;
    let decoder = codec_ctx.decoder().video().map_err(open_err)?;

    let info = FeedInfo {
        width: decoder.width(),
        height: decoder.height(),
        codec: decoder
            .codec()
            .map(|c| c.name().to_string())
            .unwrap_or_default(),
    };

    Ok(OpenedInput {
        ictx,
        decoder,
        stream_index,
        info,
    })
}

/// Demuxer options: bound every protocol read (`rw_timeout` is in microseconds).
fn input_options() -> ffmpeg_next::Dictionary<'static> {
    let mut options = ffmpeg_next::Dictionary::new();
    options.set("rw_timeout", &STREAM_READ_TIMEOUT.as_micros().to_string());
    options
}

fn run_feed(
    url: &str,
    input_format: Option<&str>,
    latest: &Mutex<Option<Frame>>,
    stopped: &AtomicBool,
    ready: &Sender<Result<FeedInfo, FeedError>>,
) {
    let OpenedInput {
        mut ictx,
        mut decoder,
        stream_index,
        info,
    } = match open_input(url, input_format) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let _ = ready.send(Ok(info));

    let mut publisher = FramePublisher::new(latest);
    for (stream, packet) in ictx.packets() {
        if stopped.load(Ordering::Relaxed) {
            log::debug!("Video feed {url} stopped after {} frames", publisher.count);
            return;
        }
        if stream.index() != stream_index {
            continue;
        }
        if decoder.send_packet(&packet).is_err() {
            continue;
        }
        publisher.drain(&mut decoder);
    }

    let _ = decoder.send_eof();
    publisher.drain(&mut decoder);
    log::info!("Video feed {url} ended after {} frames", publisher.count);
}

/// Converts decoded frames to RGB24 and swaps them into the shared slot.
struct FramePublisher<'a> {
    latest: &'a Mutex<Option<Frame>>,
    scaler: Option<ffmpeg_next::software::scaling::Context>,
    scaler_key: (ffmpeg_next::format::Pixel, u32, u32),
    count: usize,
}

impl<'a> FramePublisher<'a> {
    fn new(latest: &'a Mutex<Option<Frame>>) -> Self {
        Self {
            latest,
            scaler: None,
            scaler_key: (ffmpeg_next::format::Pixel::None, 0, 0),
            count: 0,
        }
    }

    fn drain(&mut self, decoder: &mut ffmpeg_next::decoder::Video) {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while decoder.receive_frame(&mut decoded).is_ok() {
            match self.convert(&decoded) {
                Ok(frame) => {
                    *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
                    self.count += 1;
                }
                Err(e) => log::warn!("Dropping undecodable frame: {e}"),
            }
        }
    }

    fn convert(
        &mut self,
        decoded: &ffmpeg_next::util::frame::video::Video,
    ) -> Result<Frame, ffmpeg_next::Error> {
        let (width, height) = (decoded.width(), decoded.height());
        let key = (decoded.format(), width, height);

        // Capture devices can renegotiate size or pixel format mid-stream.
        if self.scaler.is_none() || self.scaler_key != key {
            self.scaler = Some(ffmpeg_next::software::scaling::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )?);
            self.scaler_key = key;
        }

        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler.run(decoded, &mut rgb_frame)?;
        }
        let pixels = extract_rgb_pixels(&rgb_frame, width, height);
        Ok(Frame::new(pixels, width, height, 3, self.count))
    }
}

/// Copies pixel data from an ffmpeg frame into a tightly packed RGB buffer,
/// dropping the per-row stride padding.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    fn create_test_video(path: &Path, num_frames: usize, width: u32, height: u32, fps: i32) {
        ffmpeg_next::init().unwrap();

        let mut octx = ffmpeg_next::format::output(path).unwrap();
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4).unwrap();
        let mut ost = octx.add_stream(Some(codec)).unwrap();

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .unwrap();
        encoder_ctx.set_width(width);
        encoder_ctx.set_height(height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .unwrap();
        ost.set_parameters(&encoder);
        octx.write_header().unwrap();
        let ost_time_base = octx.stream(0).unwrap().time_base();

        let mut scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .unwrap();

        for i in 0..num_frames {
            let mut rgb_frame = ffmpeg_next::util::frame::video::Video::new(
                ffmpeg_next::format::Pixel::RGB24,
                width,
                height,
            );
            let stride = rgb_frame.stride(0);
            let data = rgb_frame.data_mut(0);
            let value = ((i * 40) % 256) as u8;
            for row in 0..height as usize {
                for col in 0..width as usize {
                    let offset = row * stride + col * 3;
                    data[offset] = value;
                    data[offset + 1] = value;
                    data[offset + 2] = value;
                }
            }

            let mut yuv_frame = ffmpeg_next::util::frame::video::Video::empty();
            scaler.run(&rgb_frame, &mut yuv_frame).unwrap();
            yuv_frame.set_pts(Some(i as i64));
            encoder.send_frame(&yuv_frame).unwrap();

            let mut encoded = ffmpeg_next::Packet::empty();
            while encoder.receive_packet(&mut encoded).is_ok() {
                encoded.set_stream(0);
                encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
                encoded.write_interleaved(&mut octx).unwrap();
            }
        }

        encoder.send_eof().unwrap();
        let mut encoded = ffmpeg_next::Packet::empty();
        while encoder.receive_packet(&mut encoded).is_ok() {
            encoded.set_stream(0);
            encoded.rescale_ts(ffmpeg_next::Rational(1, fps), ost_time_base);
            encoded.write_interleaved(&mut octx).unwrap();
        }
        octx.write_trailer().unwrap();
    }

    fn test_video(dir: &Path) -> PathBuf {
        let path = dir.join("feed.mp4");
        create_test_video(&path, 5, 160, 120, 30);
        path
    }

    #[test]
    fn test_start_reports_stream_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path());

        let feed = FfmpegLiveFeed::start(path.to_str().unwrap(), None).unwrap();
        assert_eq!(feed.info().width, 160);
        assert_eq!(feed.info().height, 120);
    }

    #[test]
    fn test_feed_publishes_rgb_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path());

        let feed = FfmpegLiveFeed::start(path.to_str().unwrap(), None).unwrap();
        assert!(feed.wait_for_frame(Duration::from_secs(5)));

        let frame = feed.current_frame().unwrap();
        assert_eq!(frame.width(), 160);
        assert_eq!(frame.height(), 120);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 160 * 120 * 3);
    }

    #[test]
    fn test_last_frame_survives_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path());

        let feed = FfmpegLiveFeed::start(path.to_str().unwrap(), None).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while feed.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!feed.is_running());
        assert!(feed.current_frame().is_some());
    }

    #[test]
    fn test_open_nonexistent_source_fails() {
        let result = FfmpegLiveFeed::start("/nonexistent/camera.mp4", None);
        assert!(matches!(result, Err(FeedError::Open { .. })));
    }

    #[test]
    fn test_unknown_input_format_fails() {
        let result = FfmpegLiveFeed::start("/dev/video0", Some("no-such-demuxer"));
        assert!(matches!(result, Err(FeedError::UnknownFormat(_))));
    }

    #[test]
    fn test_input_options_bound_stream_reads() {
        let options = input_options();
        assert_eq!(options.get("rw_timeout"), Some("5000000"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = test_video(dir.path());

        let mut feed = FfmpegLiveFeed::start(path.to_str().unwrap(), None).unwrap();
        feed.stop();
        feed.stop();
        assert!(!feed.is_running());
    }

    #[test]
    fn test_extract_rgb_pixels_strips_padding() {
        let frame = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            3,
            2,
        );
        let pixels = extract_rgb_pixels(&frame, 3, 2);
        assert_eq!(pixels.len(), 3 * 2 * 3);
    }
}
