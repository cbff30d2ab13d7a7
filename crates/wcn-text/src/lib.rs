//! WCN Text - Glyph Bitmap Layer
//!
//! Produces and caches rasterized glyph bitmaps for the native text engine.
//! The engine only knows integer font handles and codepoints; this crate:
//! - Registers fonts and hands out handles
//! - Rasterizes single glyphs into foreign memory (tight bounds, mono/color)
//! - Caches bitmaps in a bounded LRU keyed by font, codepoint and pixel size
//! - Prefetches glyphs on a background thread over a binary wire protocol
//! - Exposes the out-pointer entry points the engine imports

pub mod abi;
pub mod cache;
pub mod config;
pub mod context;
pub mod prefetch;
pub mod raster;
pub mod registry;
pub mod surface;
pub mod wire;
mod worker;

pub use cache::{GlyphBitmapEntry, GlyphCache, GlyphKey};
pub use config::GlyphConfig;
pub use context::{BitmapResult, GlyphContext, GlyphMetrics};
pub use prefetch::{PrefetchStats, COMMON_PUNCTUATION};
pub use raster::{BitmapMetrics, RasterParams, RasterizedGlyph};
pub use registry::{FontRecord, FontRegistry};
pub use surface::{CharMetrics, RasterSurface, SkiaSurface, SurfaceFactory};
pub use wire::{Request, Response, WireError};

use wcn_arena::MemoryError;

/// Glyph layer error types
#[derive(Debug, thiserror::Error)]
pub enum GlyphError {
    #[error("Unknown font handle: {0}")]
    UnknownFont(u32),

    #[error("Invalid codepoint: {0:#x}")]
    InvalidCodepoint(u32),

    #[error("Invalid pixel size: {0}")]
    InvalidSize(f32),

    #[error("Rasterization surface unavailable")]
    SurfaceUnavailable,

    #[error("Foreign memory: {0}")]
    Memory(#[from] MemoryError),
}

pub type Result<T> = std::result::Result<T, GlyphError>;
