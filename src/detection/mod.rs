//! Detection loop module
//!
//! Drives pose detection once per display refresh and keeps the session's
//! pose log.

pub mod log;
pub mod runner;

pub use log::PoseLog;
pub use runner::{DetectionEvent, DetectionLoop, FrameReport, LoopState, SharedPoseSource};
