use thiserror::Error;

/// Why a snapshot could not be produced. Never reaches `last_error`:
/// the action is refused before any operation starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no video frame available to capture")]
    Unavailable,
    #[error("failed to encode captured frame: {0}")]
    Encode(String),
}
