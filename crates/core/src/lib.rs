//! Capture-and-submit workflow for a remote face recognition service.
//!
//! A [`workflow::workflow_controller::WorkflowController`] snapshots a live
//! video source, encodes the frame, and submits it as one of three mutually
//! exclusive operations (register, verify, analyze). The controller owns the
//! only [`workflow::domain::workflow_state::WorkflowState`], which rendering
//! code reads but never mutates.

pub mod capture;
pub mod gateway;
pub mod shared;
pub mod workflow;
