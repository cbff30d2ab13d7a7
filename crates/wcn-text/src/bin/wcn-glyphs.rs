//! wcn-glyphs - rasterize a string with the system fonts and report per-glyph
//! metrics and cache statistics
//!
//! Usage: wcn-glyphs <family> <size> <text>

use std::time::Duration;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;
use wcn_arena::Arena;
use wcn_text::{GlyphConfig, GlyphContext};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [family, size, text] = args.as_slice() else {
        bail!("usage: wcn-glyphs <family> <size> <text>");
    };
    let size: f32 = size.parse().with_context(|| format!("invalid size '{}'", size))?;

    let mut ctx = GlyphContext::with_system_fonts(GlyphConfig::default(), Arena::default())?;
    let font = ctx.register_font(family, size);

    let requested = ctx.prefetch_text(font, text, size);
    let settled = ctx.settle(Duration::from_secs(5));
    tracing::info!("Prefetched {} codepoints (settled: {})", requested, settled);

    for ch in text.chars() {
        let bitmap = ctx
            .rasterize(font, ch as u32, size)
            .with_context(|| format!("rasterizing U+{:04X}", ch as u32))?;
        let m = bitmap.metrics;
        println!(
            "U+{:04X} {:?}: {}x{} offset ({}, {}) advance {} {}",
            ch as u32,
            ch,
            m.width,
            m.height,
            m.offset_x,
            m.offset_y,
            m.advance,
            if m.is_color { "color" } else { "mono" },
        );
        ctx.release_bitmap(bitmap);
    }

    let cache = ctx.cache();
    let stats = ctx.prefetch_stats();
    println!(
        "cache: {} entries, {} hits, {} misses, {} evictions, hit rate {:.1}%",
        cache.len(),
        cache.hits,
        cache.misses,
        cache.evictions,
        cache.hit_rate() * 100.0,
    );
    println!(
        "prefetch: {} requests, {} responses, {} glyphs, {} dropped frames",
        stats.requests_sent, stats.responses_merged, stats.glyphs_merged, stats.frames_dropped,
    );
    Ok(())
}
