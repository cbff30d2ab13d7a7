//! Glyph context
//!
//! One `GlyphContext` owns everything the foreground needs: the font
//! registry, the glyph cache, foreign memory, a surface and the prefetcher.
//! Contexts are independent; several can coexist in one process.

use std::collections::HashSet;
use std::time::Duration;

use wcn_arena::{Arena, ForeignMemory, Ptr};

use crate::cache::{GlyphBitmapEntry, GlyphCache, GlyphKey};
use crate::config::GlyphConfig;
use crate::prefetch::{common_codepoints, PrefetchStats, Prefetcher};
use crate::raster::{rasterize_glyph, reported, valid_size, BitmapMetrics, RasterParams};
use crate::registry::{FontRecord, FontRegistry};
use crate::surface::{RasterSurface, SkiaSurface, SurfaceFactory};
use crate::wire::PrefetchResponse;
use crate::{GlyphError, Result};

/// A bitmap handed to the caller. The caller owns `pixels` and releases it
/// with [`GlyphContext::release_bitmap`] (or `free` on the memory).
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitmapResult {
    pub pixels: Ptr,
    pub metrics: BitmapMetrics,
}

/// Layout metrics of a glyph at its font's nominal size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub advance: f32,
    pub left_side_bearing: f32,
    /// `[left, top, right, bottom]` relative to the pen and baseline
    pub bounding_box: [f32; 4],
}

/// Foreground glyph state
pub struct GlyphContext<M: ForeignMemory = Arena> {
    config: GlyphConfig,
    params: RasterParams,
    memory: M,
    registry: FontRegistry,
    cache: GlyphCache,
    surface: Box<dyn RasterSurface>,
    prefetcher: Prefetcher,
}

impl GlyphContext<Arena> {
    /// Context drawing with the system fonts
    pub fn with_system_fonts(config: GlyphConfig, memory: Arena) -> Result<Self> {
        let factory = SkiaSurface::factory(SkiaSurface::system_fonts(), config.initial_surface_size);
        Self::new(config, memory, factory)
    }
}

impl<M: ForeignMemory> GlyphContext<M> {
    /// Create a context. `factory` builds the foreground surface now and the
    /// worker's surface on first prefetch use.
    pub fn new(config: GlyphConfig, memory: M, factory: SurfaceFactory) -> Result<Self> {
        let surface = factory().ok_or(GlyphError::SurfaceUnavailable)?;
        Ok(Self {
            params: RasterParams::from(&config),
            cache: GlyphCache::new(config.cache_capacity),
            prefetcher: Prefetcher::new(&config, factory),
            registry: FontRegistry::new(),
            memory,
            surface,
            config,
        })
    }

    /// Register a font and mirror it to the prefetch worker
    pub fn register_font(&mut self, family: &str, size: f32) -> u32 {
        self.pump();
        let id = self.registry.register(family, size);
        tracing::info!("Registered font {} '{}' at {}px", id, family, size);
        self.prefetcher.mirror_font(id, family, size);
        id
    }

    /// Look up a registered font
    pub fn font(&self, font_id: u32) -> Option<&FontRecord> {
        self.registry.lookup(font_id)
    }

    /// Produce the bitmap of `codepoint` at `size` pixels.
    ///
    /// The returned buffer is a fresh copy; the cache keeps its own. Nothing
    /// in the cache changes when an allocation fails.
    pub fn rasterize(&mut self, font_id: u32, codepoint: u32, size: f32) -> Result<BitmapResult> {
        self.pump();

        let font = self
            .registry
            .lookup(font_id)
            .ok_or(GlyphError::UnknownFont(font_id))?;
        let ch = char::from_u32(codepoint).ok_or(GlyphError::InvalidCodepoint(codepoint))?;
        if !valid_size(size) {
            return Err(GlyphError::InvalidSize(size));
        }

        let key = GlyphKey::new(font_id, codepoint, size);
        if let Some(entry) = self.cache.peek(&key) {
            let metrics = entry.metrics;
            let pixels = self.memory.duplicate(entry.pixels, metrics.byte_len())?;
            // Touch only once the copy succeeded
            self.cache.touch(&key);
            return Ok(BitmapResult { pixels, metrics });
        }

        self.cache.record_miss();
        let glyph = rasterize_glyph(self.surface.as_mut(), font, ch, size, &self.params);

        let pixels = self.memory.alloc_bytes(&glyph.pixels)?;
        let cached = match self.memory.alloc_bytes(&glyph.pixels) {
            Ok(ptr) => ptr,
            Err(e) => {
                self.memory.free(pixels);
                return Err(e.into());
            }
        };
        self.cache.put(&mut self.memory, key, GlyphBitmapEntry {
            metrics: glyph.metrics,
            pixels: cached,
        });

        Ok(BitmapResult { pixels, metrics: glyph.metrics })
    }

    /// Advance, side bearing and box of `codepoint` at the font's nominal size
    pub fn glyph_metrics(&mut self, font_id: u32, codepoint: u32) -> Result<GlyphMetrics> {
        let font = self
            .registry
            .lookup(font_id)
            .ok_or(GlyphError::UnknownFont(font_id))?;
        let ch = char::from_u32(codepoint).ok_or(GlyphError::InvalidCodepoint(codepoint))?;

        let m = self.surface.measure_char(font, font.nominal_size, ch);
        let left_side_bearing = reported(m.bbox_left).map_or(0.0, |left| -left);

        Ok(GlyphMetrics {
            advance: m.advance,
            left_side_bearing,
            bounding_box: [
                left_side_bearing,
                reported(m.ascent).map_or(-font.nominal_size, |a| -a),
                reported(m.bbox_right).unwrap_or(m.advance),
                reported(m.descent).unwrap_or(0.0),
            ],
        })
    }

    /// Ask the worker to rasterize `codepoints` that are not cached yet.
    /// Returns how many codepoints were requested.
    pub fn prefetch(&mut self, font_id: u32, size: f32, codepoints: impl IntoIterator<Item = u32>) -> usize {
        self.pump();
        if !valid_size(size) {
            return 0;
        }

        let mut seen = HashSet::new();
        let missing: Vec<u32> = codepoints
            .into_iter()
            .filter(|&cp| seen.insert(cp))
            .filter(|&cp| !self.cache.contains(&GlyphKey::new(font_id, cp, size)))
            .collect();
        if missing.is_empty() {
            return 0;
        }

        if self.prefetcher.request(font_id, size, &missing) == 0 {
            return 0;
        }
        missing.len()
    }

    /// Prefetch the distinct characters of `text` in first-occurrence order
    pub fn prefetch_text(&mut self, font_id: u32, text: &str, size: f32) -> usize {
        self.prefetch(font_id, size, text.chars().map(u32::from))
    }

    /// Prefetch printable ASCII and common CJK punctuation
    pub fn prefetch_common(&mut self, font_id: u32, size: f32) -> usize {
        self.prefetch(font_id, size, common_codepoints())
    }

    /// Merge every prefetch response that has arrived. Never blocks.
    pub fn pump(&mut self) -> usize {
        let Self { prefetcher, cache, memory, .. } = self;
        prefetcher.poll(|resp| merge_response(cache, memory, resp))
    }

    /// Block until outstanding prefetches are merged or `timeout` passes.
    /// Returns true when nothing is left in flight.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let Self { prefetcher, cache, memory, .. } = self;
        prefetcher.settle(timeout, |resp| merge_response(cache, memory, resp))
    }

    /// Pixels of a bitmap returned by `rasterize`
    pub fn bitmap_pixels(&self, bitmap: &BitmapResult) -> Result<&[u8]> {
        Ok(self.memory.read_bytes(bitmap.pixels, bitmap.metrics.byte_len())?)
    }

    /// Free a bitmap returned by `rasterize`
    pub fn release_bitmap(&mut self, bitmap: BitmapResult) {
        self.memory.free(bitmap.pixels);
    }

    pub fn config(&self) -> &GlyphConfig {
        &self.config
    }

    pub fn cache(&self) -> &GlyphCache {
        &self.cache
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    pub fn registry(&self) -> &FontRegistry {
        &self.registry
    }

    pub fn prefetch_stats(&self) -> PrefetchStats {
        self.prefetcher.stats()
    }

    /// Prefetch requests sent to the worker and not merged yet
    pub fn pending_prefetches(&self) -> usize {
        self.prefetcher.in_flight()
    }

    /// Is the prefetch worker running?
    pub fn is_background_available(&self) -> bool {
        self.prefetcher.is_available()
    }
}

impl<M: ForeignMemory> Drop for GlyphContext<M> {
    fn drop(&mut self) {
        self.prefetcher.shutdown();
        self.cache.clear(&mut self.memory);
    }
}

/// Copy a prefetch response into the cache as fresh entries
fn merge_response<M: ForeignMemory + ?Sized>(cache: &mut GlyphCache, memory: &mut M, resp: PrefetchResponse) {
    let count = resp.glyphs.len();
    for glyph in resp.glyphs {
        let pixels = match memory.alloc_bytes(&glyph.pixels) {
            Ok(ptr) => ptr,
            Err(e) => {
                tracing::warn!("Dropping prefetched glyph U+{:04X}: {}", glyph.codepoint, e);
                continue;
            }
        };
        let key = GlyphKey {
            font_id: resp.font_id,
            codepoint: glyph.codepoint,
            pixel_size: resp.size as i32,
        };
        cache.put(memory, key, GlyphBitmapEntry { metrics: glyph.metrics, pixels });
    }
    tracing::debug!("Merged {} prefetched glyphs for font {} at {}px", count, resp.font_id, resp.size);
}
