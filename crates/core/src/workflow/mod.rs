pub mod domain;
pub mod workflow_controller;
