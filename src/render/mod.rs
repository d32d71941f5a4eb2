//! Overlay rendering
//!
//! The shared drawing surface and the skeleton renderer that paints onto it.

pub mod skeleton;
pub mod surface;

pub use skeleton::{parse_hex_color, OverlayColor, OverlayRenderer, OverlayStyle, SKELETON_EDGES};
pub use surface::{SharedSurface, Surface, SurfaceCapture, SurfaceLease};
