pub mod operation_kind;
pub mod outcome;
pub mod workflow_error;
pub mod workflow_state;
