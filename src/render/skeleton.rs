//! Skeleton overlay renderer

use super::surface::Surface;
use crate::pose::{DerivedLandmark, Joint, KeypointSet, Landmark, WorkingSet};
use image::Rgba;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Skeleton edges drawn for every frame
pub const SKELETON_EDGES: [(Joint, Joint); 14] = [
    // Torso
    (Joint::Canonical(Landmark::LeftShoulder), Joint::Canonical(Landmark::RightShoulder)),
    (Joint::Canonical(Landmark::LeftHip), Joint::Canonical(Landmark::RightHip)),
    (Joint::Derived(DerivedLandmark::ShoulderCenter), Joint::Derived(DerivedLandmark::SpineMid)),
    (Joint::Derived(DerivedLandmark::SpineMid), Joint::Derived(DerivedLandmark::PelvisCenter)),
    // Arms
    (Joint::Canonical(Landmark::LeftShoulder), Joint::Canonical(Landmark::LeftElbow)),
    (Joint::Canonical(Landmark::LeftElbow), Joint::Canonical(Landmark::LeftWrist)),
    (Joint::Canonical(Landmark::RightShoulder), Joint::Canonical(Landmark::RightElbow)),
    (Joint::Canonical(Landmark::RightElbow), Joint::Canonical(Landmark::RightWrist)),
    // Legs
    (Joint::Canonical(Landmark::LeftHip), Joint::Canonical(Landmark::LeftKnee)),
    (Joint::Canonical(Landmark::LeftKnee), Joint::Canonical(Landmark::LeftAnkle)),
    (Joint::Canonical(Landmark::RightHip), Joint::Canonical(Landmark::RightKnee)),
    (Joint::Canonical(Landmark::RightKnee), Joint::Canonical(Landmark::RightAnkle)),
    // Feet
    (Joint::Canonical(Landmark::LeftAnkle), Joint::Canonical(Landmark::LeftFootIndex)),
    (Joint::Canonical(Landmark::RightAnkle), Joint::Canonical(Landmark::RightFootIndex)),
];

/// Default skeleton color (#FFD72D)
pub const DEFAULT_COLOR: Rgba<u8> = Rgba([0xFF, 0xD7, 0x2D, 0xFF]);

/// Parse `#RRGGBB` or `#RRGGBBAA`
pub fn parse_hex_color(hex: &str) -> Option<Rgba<u8>> {
    let digits = hex.trim().strip_prefix('#')?;
    if !digits.is_ascii() || !(digits.len() == 6 || digits.len() == 8) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    let alpha = if digits.len() == 8 { channel(6)? } else { 0xFF };
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

/// Shared skeleton color; a change applies from the next render
#[derive(Clone, Debug)]
pub struct OverlayColor(Arc<RwLock<Rgba<u8>>>);

impl OverlayColor {
    pub fn new(color: Rgba<u8>) -> Self {
        Self(Arc::new(RwLock::new(color)))
    }

    pub fn get(&self) -> Rgba<u8> {
        *self.0.read()
    }

    pub fn set(&self, color: Rgba<u8>) {
        *self.0.write() = color;
    }

    /// Set from a hex string. Returns false and keeps the old color if it doesn't parse.
    pub fn set_hex(&self, hex: &str) -> bool {
        match parse_hex_color(hex) {
            Some(color) => {
                self.set(color);
                true
            }
            None => false,
        }
    }
}

impl Default for OverlayColor {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR)
    }
}

/// Overlay look configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStyle {
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_line_width")]
    pub line_width: u32,
    #[serde(default = "default_point_radius")]
    pub point_radius: u32,
}

fn default_color() -> String {
    "#FFD72D".to_string()
}
fn default_line_width() -> u32 {
    3
}
fn default_point_radius() -> u32 {
    4
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: default_color(),
            line_width: default_line_width(),
            point_radius: default_point_radius(),
        }
    }
}

/// Draws the skeleton of one frame onto a surface
#[derive(Clone)]
pub struct OverlayRenderer {
    color: OverlayColor,
    line_width: u32,
    point_radius: u32,
}

impl OverlayRenderer {
    pub fn new(color: OverlayColor, line_width: u32, point_radius: u32) -> Self {
        Self {
            color,
            line_width: line_width.max(1),
            point_radius,
        }
    }

    /// Renderer for a style; an unparsable color falls back to the default
    pub fn from_style(style: &OverlayStyle) -> Self {
        let color = parse_hex_color(&style.color).unwrap_or_else(|| {
            tracing::warn!("Invalid overlay color '{}', using default", style.color);
            DEFAULT_COLOR
        });
        Self::new(OverlayColor::new(color), style.line_width, style.point_radius)
    }

    /// Handle for changing the color while rendering
    pub fn color(&self) -> OverlayColor {
        self.color.clone()
    }

    /// Draw `keypoints` and return the frame's working set for measurement
    pub fn render(&self, surface: &mut Surface, keypoints: &KeypointSet) -> WorkingSet {
        let working = WorkingSet::from_keypoints(keypoints);
        let color = self.color.get();
        let canvas = surface.image_mut();

        let mut drawn: Vec<Joint> = Vec::with_capacity(SKELETON_EDGES.len() * 2);
        for (from, to) in SKELETON_EDGES {
            let (Some(a), Some(b)) = (working.visible(from), working.visible(to)) else {
                continue;
            };
            self.draw_thick_line(canvas, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color);
            for joint in [from, to] {
                if !drawn.contains(&joint) {
                    drawn.push(joint);
                }
            }
        }

        if self.point_radius > 0 {
            for joint in drawn {
                if let Some(p) = working.visible(joint) {
                    draw_filled_circle_mut(
                        canvas,
                        (p.x.round() as i32, p.y.round() as i32),
                        self.point_radius as i32,
                        color,
                    );
                }
            }
        }

        working
    }

    fn draw_thick_line(
        &self,
        canvas: &mut image::RgbaImage,
        start: (f32, f32),
        end: (f32, f32),
        color: Rgba<u8>,
    ) {
        let half = (self.line_width as i32 - 1) / 2;
        for offset in -half..=(self.line_width as i32 - 1 - half) {
            let o = offset as f32;
            draw_line_segment_mut(canvas, (start.0 + o, start.1), (end.0 + o, end.1), color);
            draw_line_segment_mut(canvas, (start.0, start.1 + o), (end.0, end.1 + o), color);
        }
    }
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::from_style(&OverlayStyle::default())
    }
}
