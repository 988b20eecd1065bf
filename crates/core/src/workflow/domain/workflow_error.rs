use thiserror::Error;

use crate::capture::domain::capture_error::CaptureError;
use crate::workflow::domain::operation_kind::OperationKind;

/// Pre-condition failures of `perform`. Neither starts an operation and
/// neither is written into `last_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("cannot start {requested}: {active} is still in flight")]
    Busy {
        requested: OperationKind,
        active: OperationKind,
    },
    #[error("cannot start {requested}: {source}")]
    CaptureUnavailable {
        requested: OperationKind,
        #[source]
        source: CaptureError,
    },
}
