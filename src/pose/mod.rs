//! Pose acquisition
//!
//! - Canonical keypoint naming and the frame-local working set
//! - PoseSourceAdapter around an external LandmarkEngine
//! - ReplayEngine for recorded landmark data

pub mod adapter;
pub mod keypoint;
pub mod replay;

pub use adapter::{
    DetectionError, EngineError, InitPolicy, InitializationError, LandmarkEngine,
    PoseSourceAdapter, QualityTier,
};
pub use keypoint::{
    DerivedLandmark, Joint, Keypoint, KeypointSet, Landmark, Point, RawLandmark, WorkingSet,
    VISIBILITY_FLOOR,
};
pub use replay::ReplayEngine;
