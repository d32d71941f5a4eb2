//! Biomechanics metrics
//!
//! Joint angles and base-of-support areas derived from one frame's
//! working set. The per-frame schema is fixed: four angles, two areas.

use crate::pose::{Landmark, Point, WorkingSet};
use serde::{Deserialize, Serialize};

/// Angle at vertex `b` between rays `b->a` and `b->c`, in degrees.
///
/// Returns `None` when an input is missing or a ray has zero length.
/// Rounded to one decimal place.
pub fn compute_angle(a: Option<Point>, b: Option<Point>, c: Option<Point>) -> Option<f64> {
    let (a, b, c) = (a?, b?, c?);
    let ab = (a.x - b.x, a.y - b.y);
    let cb = (c.x - b.x, c.y - b.y);

    let mag_ab = ab.0.hypot(ab.1);
    let mag_cb = cb.0.hypot(cb.1);
    if mag_ab == 0.0 || mag_cb == 0.0 || !mag_ab.is_finite() || !mag_cb.is_finite() {
        return None;
    }

    // Unit rays keep the product in range for tiny or huge separations
    let (ua, uc) = ((ab.0 / mag_ab, ab.1 / mag_ab), (cb.0 / mag_cb, cb.1 / mag_cb));
    let cos = ua.0 * uc.0 + ua.1 * uc.1;
    if !cos.is_finite() {
        return None;
    }
    let degrees = cos.clamp(-1.0, 1.0).acos().to_degrees();
    Some((degrees * 10.0).round() / 10.0)
}

/// Unsigned triangle area by the shoelace formula
pub fn compute_triangle_area(a: Option<Point>, b: Option<Point>, c: Option<Point>) -> Option<f64> {
    let (a, b, c) = (a?, b?, c?);
    let twice = a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y);
    Some((twice / 2.0).abs())
}

/// The six per-frame metrics, in export column order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    ElbowL,
    ElbowR,
    KneeL,
    KneeR,
    BaseL,
    BaseR,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::ElbowL,
        MetricKind::ElbowR,
        MetricKind::KneeL,
        MetricKind::KneeR,
        MetricKind::BaseL,
        MetricKind::BaseR,
    ];

    pub fn column(self) -> &'static str {
        match self {
            MetricKind::ElbowL => "elbowL",
            MetricKind::ElbowR => "elbowR",
            MetricKind::KneeL => "kneeL",
            MetricKind::KneeR => "kneeR",
            MetricKind::BaseL => "baseL",
            MetricKind::BaseR => "baseR",
        }
    }

    /// The three landmarks the metric is measured over (vertex in the middle)
    pub fn landmarks(self) -> [Landmark; 3] {
        match self {
            MetricKind::ElbowL => [Landmark::LeftShoulder, Landmark::LeftElbow, Landmark::LeftWrist],
            MetricKind::ElbowR => [Landmark::RightShoulder, Landmark::RightElbow, Landmark::RightWrist],
            MetricKind::KneeL => [Landmark::LeftHip, Landmark::LeftKnee, Landmark::LeftAnkle],
            MetricKind::KneeR => [Landmark::RightHip, Landmark::RightKnee, Landmark::RightAnkle],
            MetricKind::BaseL => [Landmark::LeftShoulder, Landmark::LeftHip, Landmark::LeftAnkle],
            MetricKind::BaseR => [Landmark::RightShoulder, Landmark::RightHip, Landmark::RightAnkle],
        }
    }

    pub fn is_area(self) -> bool {
        matches!(self, MetricKind::BaseL | MetricKind::BaseR)
    }
}

/// Joint angles in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Angles {
    #[serde(rename = "elbowL")]
    pub elbow_l: Option<f64>,
    #[serde(rename = "elbowR")]
    pub elbow_r: Option<f64>,
    #[serde(rename = "kneeL")]
    pub knee_l: Option<f64>,
    #[serde(rename = "kneeR")]
    pub knee_r: Option<f64>,
}

/// Base-of-support triangle areas in square pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Areas {
    #[serde(rename = "baseL")]
    pub base_l: Option<f64>,
    #[serde(rename = "baseR")]
    pub base_r: Option<f64>,
}

/// One processed frame's metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Source playback time in seconds
    pub t: f64,
    pub angles: Angles,
    pub areas: Areas,
}

impl MetricSnapshot {
    pub fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::ElbowL => self.angles.elbow_l,
            MetricKind::ElbowR => self.angles.elbow_r,
            MetricKind::KneeL => self.angles.knee_l,
            MetricKind::KneeR => self.angles.knee_r,
            MetricKind::BaseL => self.areas.base_l,
            MetricKind::BaseR => self.areas.base_r,
        }
    }

    /// Values in `MetricKind::ALL` order
    pub fn values(&self) -> [Option<f64>; 6] {
        MetricKind::ALL.map(|kind| self.get(kind))
    }
}

/// Measures one metric over a working set. Points under the visibility floor count as absent.
pub fn measure(kind: MetricKind, working: &WorkingSet) -> Option<f64> {
    let [a, b, c] = kind.landmarks().map(|lm| working.visible(lm));
    if kind.is_area() {
        compute_triangle_area(a, b, c)
    } else {
        compute_angle(a, b, c)
    }
}

/// Round a playback time in seconds to whole milliseconds
pub fn round_time(t: f64) -> f64 {
    (t * 1000.0).round() / 1000.0
}

/// Build the snapshot for a frame at time `t`, rounded to milliseconds
pub fn snapshot(t: f64, working: &WorkingSet) -> MetricSnapshot {
    MetricSnapshot {
        t: round_time(t),
        angles: Angles {
            elbow_l: measure(MetricKind::ElbowL, working),
            elbow_r: measure(MetricKind::ElbowR, working),
            knee_l: measure(MetricKind::KneeL, working),
            knee_r: measure(MetricKind::KneeR, working),
        },
        areas: Areas {
            base_l: measure(MetricKind::BaseL, working),
            base_r: measure(MetricKind::BaseR, working),
        },
    }
}
