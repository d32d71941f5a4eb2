//! Keypoint types
//!
//! The 33 canonical pose landmarks, the per-frame keypoint set produced by
//! the pose source, and the frame-local working set that adds derived
//! torso landmarks for rendering and metrics.

use serde::{Deserialize, Serialize};

/// Minimum confidence for a keypoint to be drawn or measured
pub const VISIBILITY_FLOOR: f64 = 0.2;

/// Canonical pose landmarks, in engine output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(usize)]
pub enum Landmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl Landmark {
    pub const COUNT: usize = 33;

    pub const ALL: [Landmark; Landmark::COUNT] = [
        Landmark::Nose,
        Landmark::LeftEyeInner,
        Landmark::LeftEye,
        Landmark::LeftEyeOuter,
        Landmark::RightEyeInner,
        Landmark::RightEye,
        Landmark::RightEyeOuter,
        Landmark::LeftEar,
        Landmark::RightEar,
        Landmark::MouthLeft,
        Landmark::MouthRight,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
        Landmark::LeftPinky,
        Landmark::RightPinky,
        Landmark::LeftIndex,
        Landmark::RightIndex,
        Landmark::LeftThumb,
        Landmark::RightThumb,
        Landmark::LeftHip,
        Landmark::RightHip,
        Landmark::LeftKnee,
        Landmark::RightKnee,
        Landmark::LeftAnkle,
        Landmark::RightAnkle,
        Landmark::LeftHeel,
        Landmark::RightHeel,
        Landmark::LeftFootIndex,
        Landmark::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical snake_case label
    pub fn name(self) -> &'static str {
        match self {
            Landmark::Nose => "nose",
            Landmark::LeftEyeInner => "left_eye_inner",
            Landmark::LeftEye => "left_eye",
            Landmark::LeftEyeOuter => "left_eye_outer",
            Landmark::RightEyeInner => "right_eye_inner",
            Landmark::RightEye => "right_eye",
            Landmark::RightEyeOuter => "right_eye_outer",
            Landmark::LeftEar => "left_ear",
            Landmark::RightEar => "right_ear",
            Landmark::MouthLeft => "mouth_left",
            Landmark::MouthRight => "mouth_right",
            Landmark::LeftShoulder => "left_shoulder",
            Landmark::RightShoulder => "right_shoulder",
            Landmark::LeftElbow => "left_elbow",
            Landmark::RightElbow => "right_elbow",
            Landmark::LeftWrist => "left_wrist",
            Landmark::RightWrist => "right_wrist",
            Landmark::LeftPinky => "left_pinky",
            Landmark::RightPinky => "right_pinky",
            Landmark::LeftIndex => "left_index",
            Landmark::RightIndex => "right_index",
            Landmark::LeftThumb => "left_thumb",
            Landmark::RightThumb => "right_thumb",
            Landmark::LeftHip => "left_hip",
            Landmark::RightHip => "right_hip",
            Landmark::LeftKnee => "left_knee",
            Landmark::RightKnee => "right_knee",
            Landmark::LeftAnkle => "left_ankle",
            Landmark::RightAnkle => "right_ankle",
            Landmark::LeftHeel => "left_heel",
            Landmark::RightHeel => "right_heel",
            Landmark::LeftFootIndex => "left_foot_index",
            Landmark::RightFootIndex => "right_foot_index",
        }
    }
}

/// Synthetic torso landmarks computed per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedLandmark {
    PelvisCenter,
    ShoulderCenter,
    SpineMid,
}

impl DerivedLandmark {
    pub fn name(self) -> &'static str {
        match self {
            DerivedLandmark::PelvisCenter => "pelvis_center",
            DerivedLandmark::ShoulderCenter => "shoulder_center",
            DerivedLandmark::SpineMid => "spine_mid",
        }
    }
}

/// Any joint addressable in a working set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    Canonical(Landmark),
    Derived(DerivedLandmark),
}

impl From<Landmark> for Joint {
    fn from(landmark: Landmark) -> Self {
        Joint::Canonical(landmark)
    }
}

impl From<DerivedLandmark> for Joint {
    fn from(derived: DerivedLandmark) -> Self {
        Joint::Derived(derived)
    }
}

/// A position in pixel space with its confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    pub fn is_visible(&self) -> bool {
        self.confidence >= VISIBILITY_FLOOR
    }

    /// Midpoint of several points, carrying the weakest confidence
    pub fn average(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let y = points.iter().map(|p| p.y).sum::<f64>() / n;
        let confidence = points
            .iter()
            .map(|p| p.confidence)
            .fold(f64::INFINITY, f64::min);
        Some(Point::new(x, y, confidence))
    }
}

/// Normalized landmark as reported by a pose engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    /// Relative X coordinate (0.0 to 1.0)
    pub x: f64,
    /// Relative Y coordinate (0.0 to 1.0)
    pub y: f64,
    /// Visibility score (0.0 to 1.0)
    #[serde(default = "default_visibility")]
    pub visibility: f64,
}

fn default_visibility() -> f64 {
    1.0
}

/// A single named keypoint in pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub landmark: Landmark,
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Keypoint {
    pub fn new(landmark: Landmark, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            landmark,
            x,
            y,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.landmark.name()
    }

    pub fn point(&self) -> Point {
        Point::new(self.x, self.y, self.confidence)
    }
}

/// One detected skeleton: up to 33 keypoints, at most one per landmark
#[derive(Debug, Clone)]
pub struct KeypointSet {
    slots: [Option<Keypoint>; Landmark::COUNT],
}

impl Default for KeypointSet {
    fn default() -> Self {
        Self {
            slots: [None; Landmark::COUNT],
        }
    }
}

impl KeypointSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale engine output to pixel space. Extra entries past the 33rd are ignored.
    pub fn from_normalized(raw: &[RawLandmark], width: u32, height: u32) -> Self {
        let mut set = Self::new();
        for (index, lm) in raw.iter().enumerate() {
            let Some(landmark) = Landmark::from_index(index) else {
                break;
            };
            set.insert(Keypoint::new(
                landmark,
                lm.x * width as f64,
                lm.y * height as f64,
                lm.visibility,
            ));
        }
        set
    }

    /// Insert or replace the keypoint for its landmark
    pub fn insert(&mut self, keypoint: Keypoint) {
        self.slots[keypoint.landmark.index()] = Some(keypoint);
    }

    pub fn get(&self, landmark: Landmark) -> Option<&Keypoint> {
        self.slots[landmark.index()].as_ref()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keypoint> {
        self.slots.iter().flatten()
    }
}

/// Frame-local lookup table: canonical keypoints plus derived landmarks.
///
/// Built by the renderer, read by the metrics engine, dropped with the frame.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    canonical: [Option<Point>; Landmark::COUNT],
    pelvis_center: Option<Point>,
    shoulder_center: Option<Point>,
    spine_mid: Option<Point>,
}

impl WorkingSet {
    pub fn from_keypoints(set: &KeypointSet) -> Self {
        let mut canonical = [None; Landmark::COUNT];
        for kp in set.iter() {
            canonical[kp.landmark.index()] = Some(kp.point());
        }

        let pair = |a: Landmark, b: Landmark| match (canonical[a.index()], canonical[b.index()]) {
            (Some(pa), Some(pb)) => Point::average(&[pa, pb]),
            _ => None,
        };

        let pelvis_center = pair(Landmark::LeftHip, Landmark::RightHip);
        let shoulder_center = pair(Landmark::LeftShoulder, Landmark::RightShoulder);
        let spine_mid = match (pelvis_center, shoulder_center) {
            (Some(p), Some(s)) => Point::average(&[p, s]),
            _ => None,
        };

        Self {
            canonical,
            pelvis_center,
            shoulder_center,
            spine_mid,
        }
    }

    pub fn get(&self, joint: impl Into<Joint>) -> Option<Point> {
        match joint.into() {
            Joint::Canonical(lm) => self.canonical[lm.index()],
            Joint::Derived(DerivedLandmark::PelvisCenter) => self.pelvis_center,
            Joint::Derived(DerivedLandmark::ShoulderCenter) => self.shoulder_center,
            Joint::Derived(DerivedLandmark::SpineMid) => self.spine_mid,
        }
    }

    /// Like `get`, but hides points under the visibility floor
    pub fn visible(&self, joint: impl Into<Joint>) -> Option<Point> {
        self.get(joint).filter(Point::is_visible)
    }
}
