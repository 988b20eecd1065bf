use crate::shared::frame::Frame;

/// A live, already-playing video feed.
///
/// Implementations decode in the background (or hold a fixed picture) and
/// hand out a snapshot of the most recent frame. Taking a snapshot never
/// disturbs the feed.
pub trait VideoSource: Send + Sync {
    /// Returns the latest frame, or `None` if the feed has not produced one.
    fn current_frame(&self) -> Option<Frame>;
}
