//! Prefetch wire protocol
//!
//! Compact little-endian frames exchanged with the prefetch worker. Requests
//! travel foreground to worker, responses the other way; both reuse the
//! command bytes, so each direction has its own decoder.
//!
//! ```text
//! LoadFont request   u8 cmd=1 | u16 name_len | name bytes | f32 size
//! LoadFont response  u8 cmd=1 | u32 font_id
//! Prefetch request   u8 cmd=2 | u32 font_id | f32 size | u16 count | u32 codepoint * count
//! Prefetch response  u8 cmd=2 | u32 font_id | u32 size | u16 count | u8 reserved
//!                    then per glyph: u32 codepoint | u16 width | u16 height
//!                    | f32 offset_x | f32 offset_y | f32 advance | u8 is_color
//!                    | u8 pixels[width * height * 4]
//! ```

use crate::raster::BitmapMetrics;

/// Register a font in the worker's registry
pub const CMD_LOAD_FONT: u8 = 1;
/// Rasterize a batch of codepoints
pub const CMD_PREFETCH: u8 = 2;

/// Most codepoints (or glyphs) a single frame can carry
pub const MAX_BATCH: usize = u16::MAX as usize;

/// Longest font name, in UTF-8 bytes, a LoadFont frame can carry
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Prefetch response header size
pub const RESPONSE_HEADER_LEN: usize = 12;
/// Per-glyph record header size (before the pixels)
pub const GLYPH_HEADER_LEN: usize = 21;

/// Wire protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("Frame truncated: needed {needed} bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Unknown command: {0}")]
    UnknownCommand(u8),

    #[error("Font name is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    #[error("Font name too long: {0} bytes")]
    NameTooLong(usize),

    #[error("Too many items for one frame: {0}")]
    TooManyItems(usize),

    #[error("Pixel buffer is {actual} bytes, expected {expected}")]
    PixelLengthMismatch { expected: usize, actual: usize },
}

/// Register `family` at `size` in the worker
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFont {
    pub family: String,
    pub size: f32,
}

/// Rasterize `codepoints` of `font_id` at `size`
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchRequest {
    pub font_id: u32,
    pub size: f32,
    pub codepoints: Vec<u32>,
}

/// Foreground to worker frame
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    LoadFont(LoadFont),
    Prefetch(PrefetchRequest),
}

/// One rasterized glyph in a response
#[derive(Debug, Clone, PartialEq)]
pub struct WireGlyph {
    pub codepoint: u32,
    pub metrics: BitmapMetrics,
    pub pixels: Vec<u8>,
}

/// Glyphs rasterized for one prefetch request
#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchResponse {
    pub font_id: u32,
    /// Requested size truncated to whole pixels
    pub size: u32,
    pub glyphs: Vec<WireGlyph>,
}

/// Worker to foreground frame
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    FontLoaded { font_id: u32 },
    Prefetched(PrefetchResponse),
}

impl Request {
    /// Encode into a new frame
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        match self {
            Request::LoadFont(load) => {
                let name = load.family.as_bytes();
                if name.len() > MAX_NAME_LEN {
                    return Err(WireError::NameTooLong(name.len()));
                }
                let len = name.len() as u16;
                buf.reserve(1 + 2 + name.len() + 4);
                buf.push(CMD_LOAD_FONT);
                write_u16(&mut buf, len);
                buf.extend_from_slice(name);
                write_f32(&mut buf, load.size);
            }
            Request::Prefetch(req) => {
                let count = u16::try_from(req.codepoints.len())
                    .map_err(|_| WireError::TooManyItems(req.codepoints.len()))?;
                buf.reserve(1 + 4 + 4 + 2 + req.codepoints.len() * 4);
                buf.push(CMD_PREFETCH);
                write_u32(&mut buf, req.font_id);
                write_f32(&mut buf, req.size);
                write_u16(&mut buf, count);
                for &cp in &req.codepoints {
                    write_u32(&mut buf, cp);
                }
            }
        }
        Ok(buf)
    }

    /// Decode a complete frame
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf);
        let request = match r.u8()? {
            CMD_LOAD_FONT => {
                let len = r.u16()? as usize;
                let name = std::str::from_utf8(r.bytes(len)?).map_err(|_| WireError::InvalidUtf8)?;
                let size = r.f32()?;
                Request::LoadFont(LoadFont { family: name.to_string(), size })
            }
            CMD_PREFETCH => {
                let font_id = r.u32()?;
                let size = r.f32()?;
                let count = r.u16()? as usize;
                let mut codepoints = Vec::with_capacity(count);
                for _ in 0..count {
                    codepoints.push(r.u32()?);
                }
                Request::Prefetch(PrefetchRequest { font_id, size, codepoints })
            }
            cmd => return Err(WireError::UnknownCommand(cmd)),
        };
        r.finish()?;
        Ok(request)
    }
}

impl Response {
    /// Encode into a new frame
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        match self {
            Response::FontLoaded { font_id } => {
                buf.push(CMD_LOAD_FONT);
                write_u32(&mut buf, *font_id);
            }
            Response::Prefetched(resp) => {
                let count = u16::try_from(resp.glyphs.len())
                    .map_err(|_| WireError::TooManyItems(resp.glyphs.len()))?;
                let body: usize = resp
                    .glyphs
                    .iter()
                    .map(|g| GLYPH_HEADER_LEN + g.pixels.len())
                    .sum();
                buf.reserve(RESPONSE_HEADER_LEN + body);

                buf.push(CMD_PREFETCH);
                write_u32(&mut buf, resp.font_id);
                write_u32(&mut buf, resp.size);
                write_u16(&mut buf, count);
                buf.push(0); // reserved

                for glyph in &resp.glyphs {
                    let m = &glyph.metrics;
                    if glyph.pixels.len() != m.byte_len() {
                        return Err(WireError::PixelLengthMismatch {
                            expected: m.byte_len(),
                            actual: glyph.pixels.len(),
                        });
                    }
                    write_u32(&mut buf, glyph.codepoint);
                    write_u16(&mut buf, m.width);
                    write_u16(&mut buf, m.height);
                    write_f32(&mut buf, m.offset_x);
                    write_f32(&mut buf, m.offset_y);
                    write_f32(&mut buf, m.advance);
                    buf.push(m.is_color as u8);
                    buf.extend_from_slice(&glyph.pixels);
                }
            }
        }
        Ok(buf)
    }

    /// Decode a complete frame
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf);
        let response = match r.u8()? {
            CMD_LOAD_FONT => Response::FontLoaded { font_id: r.u32()? },
            CMD_PREFETCH => {
                let font_id = r.u32()?;
                let size = r.u32()?;
                let count = r.u16()? as usize;
                let _reserved = r.u8()?;

                let mut glyphs = Vec::with_capacity(count);
                for _ in 0..count {
                    let codepoint = r.u32()?;
                    let width = r.u16()?;
                    let height = r.u16()?;
                    let offset_x = r.f32()?;
                    let offset_y = r.f32()?;
                    let advance = r.f32()?;
                    let is_color = r.u8()? != 0;

                    let metrics = BitmapMetrics { width, height, offset_x, offset_y, advance, is_color };
                    let pixels = r.bytes(metrics.byte_len())?.to_vec();
                    glyphs.push(WireGlyph { codepoint, metrics, pixels });
                }
                Response::Prefetched(PrefetchResponse { font_id, size, glyphs })
            }
            cmd => return Err(WireError::UnknownCommand(cmd)),
        };
        r.finish()?;
        Ok(response)
    }
}

/// Write u16 little-endian
fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Write u32 little-endian
fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Write f32 little-endian
fn write_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Bounds-checked cursor over a frame
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(WireError::Truncated { offset: self.pos, needed: len })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Reject anything left over
    fn finish(self) -> Result<(), WireError> {
        match self.buf.len() - self.pos {
            0 => Ok(()),
            n => Err(WireError::TrailingBytes(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(codepoint: u32, width: u16, height: u16) -> WireGlyph {
        WireGlyph {
            codepoint,
            metrics: BitmapMetrics {
                width,
                height,
                offset_x: -1.0,
                offset_y: -12.0,
                advance: 9.5,
                is_color: false,
            },
            pixels: vec![0x7F; width as usize * height as usize * 4],
        }
    }

    #[test]
    fn test_load_font_layout() {
        let frame = Request::LoadFont(LoadFont { family: "Test".into(), size: 16.0 })
            .encode()
            .unwrap();

        assert_eq!(frame[0], CMD_LOAD_FONT);
        assert_eq!(&frame[1..3], &[4, 0]);
        assert_eq!(&frame[3..7], b"Test");
        assert_eq!(&frame[7..], &16.0f32.to_le_bytes());
    }

    #[test]
    fn test_prefetch_request_preserves_order() {
        let codepoints: Vec<u32> = vec![0x4E2D, 'a' as u32, 0x1F600, 'a' as u32 + 1, 32];
        let request = Request::Prefetch(PrefetchRequest { font_id: 7, size: 15.5, codepoints });

        let frame = request.encode().unwrap();
        assert_eq!(frame.len(), 1 + 4 + 4 + 2 + 5 * 4);
        assert_eq!(Request::decode(&frame).unwrap(), request);
    }

    #[test]
    fn test_response_layout() {
        let response = Response::Prefetched(PrefetchResponse {
            font_id: 3,
            size: 16,
            glyphs: vec![glyph(65, 2, 3), glyph(66, 1, 1)],
        });
        let frame = response.encode().unwrap();

        assert_eq!(frame.len(), RESPONSE_HEADER_LEN + 2 * GLYPH_HEADER_LEN + 2 * 3 * 4 + 4);
        assert_eq!(frame[0], CMD_PREFETCH);
        assert_eq!(&frame[1..5], &3u32.to_le_bytes());
        assert_eq!(&frame[5..9], &16u32.to_le_bytes());
        assert_eq!(&frame[9..11], &2u16.to_le_bytes());
        assert_eq!(frame[11], 0);
        assert_eq!(&frame[12..16], &65u32.to_le_bytes());

        assert_eq!(Response::decode(&frame).unwrap(), response);
    }

    #[test]
    fn test_empty_response() {
        let response = Response::Prefetched(PrefetchResponse { font_id: 1, size: 12, glyphs: vec![] });
        let frame = response.encode().unwrap();
        assert_eq!(frame.len(), RESPONSE_HEADER_LEN);
        assert_eq!(Response::decode(&frame).unwrap(), response);
    }

    #[test]
    fn test_font_loaded() {
        let frame = Response::FontLoaded { font_id: 42 }.encode().unwrap();
        assert_eq!(frame, vec![1, 42, 0, 0, 0]);
        assert_eq!(Response::decode(&frame).unwrap(), Response::FontLoaded { font_id: 42 });
    }

    #[test]
    fn test_truncated() {
        let frame = Request::Prefetch(PrefetchRequest { font_id: 1, size: 16.0, codepoints: vec![1, 2, 3] })
            .encode()
            .unwrap();
        let err = Request::decode(&frame[..frame.len() - 2]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));

        assert!(matches!(Request::decode(&[]), Err(WireError::Truncated { offset: 0, needed: 1 })));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(Request::decode(&[9, 0, 0]), Err(WireError::UnknownCommand(9)));
        assert_eq!(Response::decode(&[0]), Err(WireError::UnknownCommand(0)));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut frame = Response::FontLoaded { font_id: 1 }.encode().unwrap();
        frame.push(0);
        assert_eq!(Response::decode(&frame), Err(WireError::TrailingBytes(1)));
    }

    #[test]
    fn test_invalid_utf8_name() {
        let frame = [CMD_LOAD_FONT, 2, 0, 0xC3, 0x28, 0, 0, 0x80, 0x41];
        assert_eq!(Request::decode(&frame), Err(WireError::InvalidUtf8));
    }

    #[test]
    fn test_encode_limits() {
        let longest = "x".repeat(MAX_NAME_LEN);
        assert!(Request::LoadFont(LoadFont { family: longest, size: 1.0 }).encode().is_ok());
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert_eq!(
            Request::LoadFont(LoadFont { family: long, size: 1.0 }).encode(),
            Err(WireError::NameTooLong(MAX_NAME_LEN + 1))
        );

        let many = vec![65; MAX_BATCH + 1];
        assert_eq!(
            Request::Prefetch(PrefetchRequest { font_id: 1, size: 1.0, codepoints: many }).encode(),
            Err(WireError::TooManyItems(MAX_BATCH + 1))
        );

        let mut bad = glyph(65, 2, 2);
        bad.pixels.pop();
        let response = Response::Prefetched(PrefetchResponse { font_id: 1, size: 1, glyphs: vec![bad] });
        assert_eq!(
            response.encode(),
            Err(WireError::PixelLengthMismatch { expected: 16, actual: 15 })
        );
    }
}
