//! Deterministic box-drawing surface for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CharMetrics, RasterSurface};
use crate::registry::FontRecord;

/// Pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Draws a solid box per character: red for emoji, gray otherwise
pub struct MockSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    pub draws: Arc<AtomicUsize>,
}

impl MockSurface {
    pub const GRAY_INK: [u8; 4] = [128, 128, 128, 255];
    pub const COLOR_INK: [u8; 4] = [220, 30, 30, 255];

    pub fn new() -> Self {
        Self::with_size(64)
    }

    pub fn with_size(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            pixels: vec![0; (size * size * 4) as usize],
            draws: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn is_color(ch: char) -> bool {
        ch as u32 >= 0x1F300
    }

    pub fn advance(ch: char, size: f32) -> f32 {
        if ch.is_whitespace() {
            size * 0.25
        } else if Self::is_color(ch) {
            size
        } else {
            size * 0.6
        }
    }

    fn descent(ch: char, size: f32) -> Option<f32> {
        matches!(ch, 'g' | 'j' | 'p' | 'q' | 'y').then(|| (size * 0.2).round())
    }

    /// Where `ch` puts ink when drawn with its pen at (`x`, `baseline`)
    pub fn ink_rect(ch: char, size: f32, x: f32, baseline: f32) -> InkRect {
        let top = (baseline - (size * 0.7).round()).max(0.0);
        let bottom = baseline + Self::descent(ch, size).unwrap_or(0.0);
        InkRect {
            x: (x + 1.0).round() as u32,
            y: top as u32,
            width: (size * 0.5).round().max(1.0) as u32,
            height: (bottom - top).max(1.0) as u32,
        }
    }
}

impl RasterSurface for MockSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn ensure_size(&mut self, min: u32) {
        if min <= self.width && min <= self.height {
            return;
        }
        self.width = self.width.max(min);
        self.height = self.height.max(min);
        self.pixels = vec![0; (self.width * self.height * 4) as usize];
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn fill_char(&mut self, _font: &FontRecord, size: f32, ch: char, x: f32, baseline: f32) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        if ch.is_whitespace() {
            return;
        }

        let ink = if Self::is_color(ch) { Self::COLOR_INK } else { Self::GRAY_INK };
        let rect = Self::ink_rect(ch, size, x, baseline);
        for y in rect.y..(rect.y + rect.height).min(self.height) {
            for x in rect.x..(rect.x + rect.width).min(self.width) {
                let i = ((y * self.width + x) * 4) as usize;
                self.pixels[i..i + 4].copy_from_slice(&ink);
            }
        }
    }

    fn measure_char(&mut self, _font: &FontRecord, size: f32, ch: char) -> CharMetrics {
        let advance = Self::advance(ch, size);
        if ch.is_whitespace() {
            return CharMetrics { advance, ..Default::default() };
        }

        let rect = Self::ink_rect(ch, size, 0.0, 0.0);
        CharMetrics {
            advance,
            bbox_left: Some(-1.0),
            bbox_right: Some(1.0 + rect.width as f32),
            ascent: Some((size * 0.7).round()),
            descent: Self::descent(ch, size),
        }
    }

    fn read_rgba(&self, width: u32, height: u32) -> Vec<u8> {
        let (width, height) = (width.min(self.width), height.min(self.height));
        let mut out = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            let start = ((y * self.width) * 4) as usize;
            out.extend_from_slice(&self.pixels[start..start + (width * 4) as usize]);
        }
        out
    }
}
