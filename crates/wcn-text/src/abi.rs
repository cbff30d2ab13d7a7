//! Engine-facing entry points
//!
//! The native engine addresses everything through foreign memory: strings
//! come in as NUL-terminated UTF-8 pointers and results go out through
//! caller-supplied slots. Each call reports success as a `bool`; a bad
//! pointer anywhere is a failure, never a panic.

use wcn_arena::{ForeignMemory, Ptr};

use crate::context::GlyphContext;

/// Output slots for [`generate_bitmap`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitmapOutputs {
    /// i32: address of the RGBA pixels (caller frees)
    pub pixels: Ptr,
    /// i32
    pub width: Ptr,
    /// i32
    pub height: Ptr,
    /// f32
    pub offset_x: Ptr,
    /// f32
    pub offset_y: Ptr,
    /// f32
    pub advance: Ptr,
    /// i8, optional (`Ptr::NULL` skips it)
    pub is_color: Ptr,
}

/// Register the font named by the string at `name` and store its id (u32)
/// at `out_id`
pub fn load_font<M: ForeignMemory>(ctx: &mut GlyphContext<M>, name: Ptr, size: f32, out_id: Ptr) -> bool {
    let family = match ctx.memory().read_c_str(name) {
        Ok(family) => family,
        Err(e) => {
            tracing::debug!("load_font: bad name pointer: {}", e);
            return false;
        }
    };

    let id = ctx.register_font(&family, size);
    ctx.memory_mut().write_u32(out_id, id).is_ok()
}

/// Store advance, left side bearing and the 4-float bounding box
pub fn get_glyph_metrics<M: ForeignMemory>(
    ctx: &mut GlyphContext<M>,
    font_id: u32,
    codepoint: u32,
    out_advance: Ptr,
    out_lsb: Ptr,
    out_box: Ptr,
) -> bool {
    let Ok(metrics) = ctx.glyph_metrics(font_id, codepoint) else {
        return false;
    };

    let memory = ctx.memory_mut();
    let mut write = || -> wcn_arena::Result<()> {
        memory.write_f32(out_advance, metrics.advance)?;
        memory.write_f32(out_lsb, metrics.left_side_bearing)?;
        for (i, value) in metrics.bounding_box.iter().enumerate() {
            let slot = out_box.offset(i as u32 * 4).ok_or(wcn_arena::MemoryError::OutOfBounds {
                ptr: out_box,
                len: 16,
            })?;
            memory.write_f32(slot, *value)?;
        }
        Ok(())
    };
    write().is_ok()
}

/// Rasterize a glyph into a new buffer and store its address and metrics.
/// The buffer is released again if any output slot is unusable.
pub fn generate_bitmap<M: ForeignMemory>(
    ctx: &mut GlyphContext<M>,
    font_id: u32,
    codepoint: u32,
    size: f32,
    out: &BitmapOutputs,
) -> bool {
    let bitmap = match ctx.rasterize(font_id, codepoint, size) {
        Ok(bitmap) => bitmap,
        Err(e) => {
            tracing::debug!("generate_bitmap U+{:04X}: {}", codepoint, e);
            return false;
        }
    };

    let m = bitmap.metrics;
    let memory = ctx.memory_mut();
    let mut write = || -> wcn_arena::Result<()> {
        memory.write_i32(out.pixels, bitmap.pixels.0 as i32)?;
        memory.write_i32(out.width, m.width as i32)?;
        memory.write_i32(out.height, m.height as i32)?;
        memory.write_f32(out.offset_x, m.offset_x)?;
        memory.write_f32(out.offset_y, m.offset_y)?;
        memory.write_f32(out.advance, m.advance)?;
        if !out.is_color.is_null() {
            memory.write_u8(out.is_color, m.is_color as u8)?;
        }
        Ok(())
    };

    if write().is_err() {
        ctx.release_bitmap(bitmap);
        return false;
    }
    true
}

/// Prefetch the characters of the string at `text`
pub fn prerender_text<M: ForeignMemory>(ctx: &mut GlyphContext<M>, font_id: u32, text: Ptr, size: f32) -> bool {
    match ctx.memory().read_c_str(text) {
        Ok(text) => {
            ctx.prefetch_text(font_id, &text, size);
            true
        }
        Err(_) => false,
    }
}

/// Prefetch printable ASCII and common CJK punctuation
pub fn prerender_common<M: ForeignMemory>(ctx: &mut GlyphContext<M>, font_id: u32, size: f32) {
    ctx.prefetch_common(font_id, size);
}
