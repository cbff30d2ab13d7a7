//! Rasterization surfaces
//!
//! A surface can draw a single character and read the pixels back. The
//! rasterizer only talks to this trait; `SkiaSurface` is the real one.

mod skia;
#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

pub use skia::SkiaSurface;

use crate::registry::FontRecord;

/// Horizontal metrics of one character at one size (pixels).
///
/// Optional fields are `None` when the font does not report them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CharMetrics {
    pub advance: f32,
    /// Extent of the ink to the left of the pen (positive leftwards)
    pub bbox_left: Option<f32>,
    /// Extent of the ink to the right of the pen
    pub bbox_right: Option<f32>,
    /// Ink extent above the baseline
    pub ascent: Option<f32>,
    /// Ink extent below the baseline
    pub descent: Option<f32>,
}

/// Drawing target for single glyphs
pub trait RasterSurface: Send {
    /// Current width and height in pixels
    fn size(&self) -> (u32, u32);

    /// Grow to at least `min` pixels on each side. Never shrinks.
    fn ensure_size(&mut self, min: u32);

    /// Make every pixel fully transparent
    fn clear(&mut self);

    /// Draw `ch` in opaque white with its pen at `x` and baseline at `baseline`
    fn fill_char(&mut self, font: &FontRecord, size: f32, ch: char, x: f32, baseline: f32);

    /// Measure `ch` without drawing
    fn measure_char(&mut self, font: &FontRecord, size: f32, ch: char) -> CharMetrics;

    /// Straight RGBA of the top-left `width` x `height` region, row-major.
    /// The region is clamped to the surface.
    fn read_rgba(&self, width: u32, height: u32) -> Vec<u8>;
}

/// Builds a surface; `None` means no surface could be created
pub type SurfaceFactory = Arc<dyn Fn() -> Option<Box<dyn RasterSurface>> + Send + Sync>;
