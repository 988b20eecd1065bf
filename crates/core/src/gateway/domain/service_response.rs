use serde::Serialize;
use thiserror::Error;

/// Why a remote call did not produce an outcome.
///
/// `Transport` and `ServerRejected` stay distinct so callers can tell
/// "never got an answer" from "the service said no". `Display` is the
/// user-facing banner text.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("{message}")]
    Transport { message: String },
    #[error("{message}")]
    ServerRejected { status: u16, message: String },
    #[error("no face detected in the captured image")]
    NoFaceDetected,
}

impl FailureReason {
    pub fn transport(message: impl Into<String>) -> Self {
        FailureReason::Transport {
            message: message.into(),
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        FailureReason::ServerRejected {
            status,
            message: message.into(),
        }
    }
}

/// Typed result of one gateway call: `Ok(outcome)` or `Err(reason)`.
pub type ServiceResponse<T> = Result<T, FailureReason>;
