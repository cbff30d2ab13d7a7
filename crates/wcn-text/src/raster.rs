//! Single-glyph rasterization
//!
//! Draws one character on a surface, scans the ink, and packs a tight RGBA
//! bitmap. Shared by the foreground rasterizer and the prefetch worker, so
//! both sides produce identical bitmaps for the same input.

use crate::config::GlyphConfig;
use crate::registry::FontRecord;
use crate::surface::RasterSurface;

/// Largest accepted pixel size; keeps bitmap dimensions within `u16`
pub const MAX_PIXEL_SIZE: f32 = 16384.0;

/// Geometry of a glyph bitmap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitmapMetrics {
    pub width: u16,
    pub height: u16,
    /// Left edge relative to the pen position
    pub offset_x: f32,
    /// Top edge relative to the baseline
    pub offset_y: f32,
    pub advance: f32,
    /// Straight RGBA (emoji etc.) rather than an intensity mask
    pub is_color: bool,
}

impl BitmapMetrics {
    /// Size of the RGBA pixel buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// A rasterized glyph in host memory
#[derive(Debug, Clone, PartialEq)]
pub struct RasterizedGlyph {
    pub metrics: BitmapMetrics,
    /// RGBA8, `metrics.byte_len()` bytes
    pub pixels: Vec<u8>,
}

impl RasterizedGlyph {
    /// 1x1 transparent bitmap that still carries the advance
    pub fn blank(advance: f32) -> Self {
        Self {
            metrics: BitmapMetrics {
                width: 1,
                height: 1,
                offset_x: 0.0,
                offset_y: 0.0,
                advance,
                is_color: false,
            },
            pixels: vec![0; 4],
        }
    }
}

/// Rasterization tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterParams {
    pub padding: u32,
    pub descent_fallback: f32,
    pub color_threshold: u8,
}

impl Default for RasterParams {
    fn default() -> Self {
        Self::from(&GlyphConfig::default())
    }
}

impl From<&GlyphConfig> for RasterParams {
    fn from(config: &GlyphConfig) -> Self {
        Self {
            padding: config.padding,
            descent_fallback: config.descent_fallback,
            color_threshold: config.color_threshold,
        }
    }
}

/// Cache slot size for a requested size (truncated toward zero)
pub fn pixel_size(size: f32) -> i32 {
    size as i32
}

/// Can a glyph be rasterized at `size`?
pub fn valid_size(size: f32) -> bool {
    size.is_finite() && size > 0.0 && size <= MAX_PIXEL_SIZE
}

/// Treat a zero measurement the same as a missing one
pub(crate) fn reported(value: Option<f32>) -> Option<f32> {
    value.filter(|v| *v != 0.0)
}

/// Rasterize `ch` at `size` pixels.
///
/// The character is drawn at `(padding, round(size))` on a cleared surface.
/// The scan covers the advance plus padding horizontally and the descent plus
/// padding below the baseline.
pub fn rasterize_glyph(
    surface: &mut dyn RasterSurface,
    font: &FontRecord,
    ch: char,
    size: f32,
    params: &RasterParams,
) -> RasterizedGlyph {
    let pad = params.padding as f32;
    let needed = (size + pad * 2.0).ceil().max(1.0) as u32;
    surface.ensure_size(needed);
    surface.clear();

    let draw_x = pad;
    let draw_y = size.round();
    surface.fill_char(font, size, ch, draw_x, draw_y);

    let measured = surface.measure_char(font, size, ch);
    let descent = reported(measured.descent).unwrap_or(size * params.descent_fallback);

    let (surface_w, surface_h) = surface.size();
    let scan_w = scan_extent(draw_x + measured.advance + pad, surface_w);
    let scan_h = scan_extent(draw_y + descent + pad, surface_h);

    let mut data = surface.read_rgba(scan_w, scan_h);
    data.resize(scan_w as usize * scan_h as usize * 4, 0);

    let Some(ink) = scan_ink(&data, scan_w, scan_h, params.color_threshold) else {
        return RasterizedGlyph::blank(measured.advance);
    };

    let min_x = ink.min_x.saturating_sub(1);
    let max_x = (ink.max_x + 1).min(scan_w - 1);
    let min_y = ink.min_y.saturating_sub(1);
    let max_y = (ink.max_y + 1).min(scan_h - 1);

    let width = max_x - min_x + 1;
    let height = max_y - min_y + 1;
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);

    for y in min_y..=max_y {
        let row = (y * scan_w) as usize;
        for x in min_x..=max_x {
            let i = (row + x as usize) * 4;
            let px = &data[i..i + 4];
            if ink.is_color {
                pixels.extend_from_slice(px);
            } else {
                let a = px[3];
                pixels.extend_from_slice(&[a, a, a, 255]);
            }
        }
    }

    RasterizedGlyph {
        metrics: BitmapMetrics {
            width: width as u16,
            height: height as u16,
            offset_x: min_x as f32 - draw_x,
            offset_y: min_y as f32 - draw_y,
            advance: measured.advance,
            is_color: ink.is_color,
        },
        pixels,
    }
}

/// Pixel extent of a scan edge, clamped to the surface and to `u16`
fn scan_extent(edge: f32, limit: u32) -> u32 {
    let edge = if edge.is_finite() { edge.ceil().max(0.0) } else { 0.0 };
    (edge as u32).min(limit).min(u16::MAX as u32)
}

/// Tight ink bounds of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InkBounds {
    min_x: u32,
    max_x: u32,
    min_y: u32,
    max_y: u32,
    is_color: bool,
}

/// Find every pixel with non-zero alpha; classify the glyph as color when
/// any inked pixel has a channel spread above `threshold`.
fn scan_ink(data: &[u8], width: u32, height: u32, threshold: u8) -> Option<InkBounds> {
    let mut bounds: Option<InkBounds> = None;

    for y in 0..height {
        for x in 0..width {
            let i = ((y * width + x) * 4) as usize;
            let (r, g, b, a) = (data[i], data[i + 1], data[i + 2], data[i + 3]);
            if a == 0 {
                continue;
            }

            let colored = r.abs_diff(g) > threshold || g.abs_diff(b) > threshold;
            match bounds.as_mut() {
                None => {
                    bounds = Some(InkBounds {
                        min_x: x,
                        max_x: x,
                        min_y: y,
                        max_y: y,
                        is_color: colored,
                    });
                }
                Some(bb) => {
                    bb.min_x = bb.min_x.min(x);
                    bb.max_x = bb.max_x.max(x);
                    bb.min_y = bb.min_y.min(y);
                    bb.max_y = bb.max_y.max(y);
                    bb.is_color |= colored;
                }
            }
        }
    }
    bounds
}
