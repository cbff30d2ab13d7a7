//! Glyph layer configuration

use serde::Deserialize;

/// Glyph layer configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlyphConfig {
    /// Maximum number of cached glyph bitmaps
    pub cache_capacity: usize,

    /// Transparent margin around the drawn glyph (pixels)
    pub padding: u32,

    /// Surface width and height at creation (pixels)
    pub initial_surface_size: u32,

    /// Descent estimate as a fraction of the size, used when the surface
    /// reports none
    pub descent_fallback: f32,

    /// Largest per-channel difference still treated as gray
    pub color_threshold: u8,

    /// Start the background prefetch worker on first use
    pub background: bool,

    /// Thread name of the prefetch worker
    pub worker_name: String,
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            padding: 4,
            initial_surface_size: 512,
            descent_fallback: 0.3,
            color_threshold: 2,
            background: true,
            worker_name: "wcn-glyph-prefetch".to_string(),
        }
    }
}

impl GlyphConfig {
    /// Configuration without a background worker
    pub fn synchronous() -> Self {
        Self {
            background: false,
            ..Self::default()
        }
    }
}
