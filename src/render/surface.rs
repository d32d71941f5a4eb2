//! Drawing surface
//!
//! An RGBA canvas shared between the detection loop (writer) and the
//! overlay capture of the recorder (reader). Active users hold a lease;
//! resizing is refused while any lease is outstanding.

use crate::utils::error::{AppError, AppResult};
use crate::video::{MediaStream, VideoFrame};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// RGBA pixel canvas
#[derive(Debug, Clone)]
pub struct Surface {
    image: RgbaImage,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Paint a source frame over the whole surface, scaling when sizes differ
    pub fn draw_frame(&mut self, frame: &RgbaImage) {
        if frame.dimensions() == self.image.dimensions() {
            self.image.copy_from_slice(frame.as_raw());
        } else if self.width() > 0 && self.height() > 0 {
            self.image = imageops::resize(frame, self.width(), self.height(), FilterType::Triangle);
        }
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }
}

/// Handle to a surface shared across tasks
#[derive(Clone)]
pub struct SharedSurface {
    inner: Arc<Mutex<Surface>>,
    leases: Arc<AtomicUsize>,
}

impl SharedSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Surface::new(width, height))),
            leases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Surface> {
        self.inner.lock()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let surface = self.inner.lock();
        (surface.width(), surface.height())
    }

    /// Mark the surface as in use until the returned lease is dropped
    pub fn lease(&self) -> SurfaceLease {
        self.leases.fetch_add(1, Ordering::SeqCst);
        SurfaceLease {
            leases: self.leases.clone(),
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.leases.load(Ordering::SeqCst) > 0
    }

    /// Resize (and clear) the surface. Refused while a loop or recorder is using it.
    pub fn resize(&self, width: u32, height: u32) -> AppResult<()> {
        if self.is_in_use() {
            return Err(AppError::SurfaceBusy(format!(
                "cannot resize to {}x{} while the surface is in use",
                width, height
            )));
        }
        let mut surface = self.inner.lock();
        if (surface.width(), surface.height()) != (width, height) {
            tracing::debug!("Resizing surface to {}x{}", width, height);
            *surface = Surface::new(width, height);
        }
        Ok(())
    }

    /// Copy of the current pixels
    pub fn snapshot(&self) -> RgbaImage {
        self.inner.lock().image().clone()
    }

    /// Open a capture stream over this surface
    pub fn capture(&self) -> SurfaceCapture {
        SurfaceCapture {
            surface: self.clone(),
            _lease: self.lease(),
            started: Instant::now(),
        }
    }
}

/// Marks a surface as in use while alive
pub struct SurfaceLease {
    leases: Arc<AtomicUsize>,
}

impl Drop for SurfaceLease {
    fn drop(&mut self) {
        self.leases.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Stream of surface snapshots, stamped with time since capture started
pub struct SurfaceCapture {
    surface: SharedSurface,
    _lease: SurfaceLease,
    started: Instant,
}

impl MediaStream for SurfaceCapture {
    fn read_frame(&mut self) -> Option<VideoFrame> {
        let image = self.surface.snapshot();
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        Some(VideoFrame::new(image, self.started.elapsed().as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_frame_same_size_copies() {
        let mut surface = Surface::new(2, 2);
        let frame = RgbaImage::from_pixel(2, 2, Rgba([9, 8, 7, 255]));
        surface.draw_frame(&frame);
        assert_eq!(surface.image().get_pixel(1, 1), &Rgba([9, 8, 7, 255]));
    }

    #[test]
    fn test_draw_frame_scales() {
        let mut surface = Surface::new(4, 4);
        let frame = RgbaImage::from_pixel(2, 2, Rgba([10, 10, 10, 255]));
        surface.draw_frame(&frame);
        assert_eq!(surface.width(), 4);
        assert_eq!(surface.image().get_pixel(3, 3), &Rgba([10, 10, 10, 255]));
    }

    #[test]
    fn test_resize_refused_while_leased() {
        let surface = SharedSurface::new(2, 2);
        let lease = surface.lease();
        assert!(matches!(surface.resize(4, 4), Err(AppError::SurfaceBusy(_))));
        drop(lease);
        surface.resize(4, 4).unwrap();
        assert_eq!(surface.dimensions(), (4, 4));
    }

    #[test]
    fn test_capture_holds_lease() {
        let surface = SharedSurface::new(2, 2);
        let mut capture = surface.capture();
        assert!(surface.is_in_use());
        assert!(capture.read_frame().is_some());
        drop(capture);
        assert!(!surface.is_in_use());
    }
}
