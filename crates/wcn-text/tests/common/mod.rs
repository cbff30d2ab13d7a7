//! Shared helpers for wcn-text integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wcn_text::{CharMetrics, FontRecord, RasterSurface, SurfaceFactory};

/// Gray ink for ordinary glyphs
pub const GRAY: [u8; 4] = [90, 90, 90, 255];
/// Red ink for emoji
pub const RED: [u8; 4] = [230, 20, 40, 255];

/// Deterministic surface: a solid box per glyph, nothing for whitespace
pub struct BoxSurface {
    side: u32,
    pixels: Vec<u8>,
    draws: Arc<AtomicUsize>,
}

impl BoxSurface {
    pub fn new(draws: Arc<AtomicUsize>) -> Self {
        Self {
            side: 48,
            pixels: vec![0; 48 * 48 * 4],
            draws,
        }
    }

    pub fn advance(ch: char, size: f32) -> f32 {
        if ch.is_whitespace() { size * 0.25 } else { size * 0.6 }
    }
}

impl RasterSurface for BoxSurface {
    fn size(&self) -> (u32, u32) {
        (self.side, self.side)
    }

    fn ensure_size(&mut self, min: u32) {
        if min > self.side {
            self.side = min;
            self.pixels = vec![0; (min * min * 4) as usize];
        }
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn fill_char(&mut self, _font: &FontRecord, size: f32, ch: char, x: f32, baseline: f32) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        if ch.is_whitespace() {
            return;
        }

        let ink = if ch as u32 >= 0x1F300 { RED } else { GRAY };
        let x0 = x as u32 + 1;
        let y0 = (baseline - (size * 0.7).round()) as u32;
        let (w, h) = ((size * 0.5).round() as u32, (size * 0.7).round() as u32);
        for y in y0..(y0 + h).min(self.side) {
            for x in x0..(x0 + w).min(self.side) {
                let i = ((y * self.side + x) * 4) as usize;
                self.pixels[i..i + 4].copy_from_slice(&ink);
            }
        }
    }

    fn measure_char(&mut self, _font: &FontRecord, size: f32, ch: char) -> CharMetrics {
        CharMetrics {
            advance: Self::advance(ch, size),
            ..Default::default()
        }
    }

    fn read_rgba(&self, width: u32, height: u32) -> Vec<u8> {
        let (width, height) = (width.min(self.side), height.min(self.side));
        let mut out = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            let start = (y * self.side * 4) as usize;
            out.extend_from_slice(&self.pixels[start..start + (width * 4) as usize]);
        }
        out
    }
}

/// Draw counters for the foreground surface (built first) and every
/// surface built after it (the prefetch worker's)
pub struct Counters {
    pub foreground: Arc<AtomicUsize>,
    pub background: Arc<AtomicUsize>,
}

impl Counters {
    pub fn foreground(&self) -> usize {
        self.foreground.load(Ordering::SeqCst)
    }

    pub fn background(&self) -> usize {
        self.background.load(Ordering::SeqCst)
    }
}

/// Factory handing out `BoxSurface`s. With `background_ok = false` every
/// surface after the first fails to build.
pub fn box_factory(background_ok: bool) -> (SurfaceFactory, Counters) {
    let counters = Counters {
        foreground: Arc::new(AtomicUsize::new(0)),
        background: Arc::new(AtomicUsize::new(0)),
    };
    let built = Mutex::new(0usize);
    let (fg, bg) = (counters.foreground.clone(), counters.background.clone());

    let factory: SurfaceFactory = Arc::new(move || {
        let mut built = built.lock().ok()?;
        *built += 1;
        match *built {
            1 => Some(Box::new(BoxSurface::new(fg.clone())) as Box<dyn RasterSurface>),
            _ if background_ok => Some(Box::new(BoxSurface::new(bg.clone())) as Box<dyn RasterSurface>),
            _ => None,
        }
    });
    (factory, counters)
}
