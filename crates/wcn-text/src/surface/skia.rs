//! tiny-skia surface backed by a fontdb font database

use std::collections::HashMap;
use std::sync::Arc;

use fontdb::{Database, Family, Query, ID};
use tiny_skia::{Color, FillRule, Paint, Pixmap, Transform};
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use super::{CharMetrics, RasterSurface, SurfaceFactory};
use crate::registry::FontRecord;

/// Glyph drawing surface
pub struct SkiaSurface {
    pixmap: Pixmap,
    fonts: Arc<Database>,
    /// Resolved face per family string (`None`: nothing matched)
    faces: HashMap<String, Option<ID>>,
}

impl SkiaSurface {
    /// Create a `size` x `size` surface. Returns `None` for a zero size.
    pub fn new(fonts: Arc<Database>, size: u32) -> Option<Self> {
        Some(Self {
            pixmap: Pixmap::new(size, size)?,
            fonts,
            faces: HashMap::new(),
        })
    }

    /// Database with the system fonts loaded
    pub fn system_fonts() -> Arc<Database> {
        let mut db = Database::new();
        db.load_system_fonts();
        tracing::info!("Loaded {} system font faces", db.len());
        Arc::new(db)
    }

    /// Factory producing surfaces that share `fonts`
    pub fn factory(fonts: Arc<Database>, size: u32) -> SurfaceFactory {
        Arc::new(move || {
            SkiaSurface::new(fonts.clone(), size).map(|s| Box::new(s) as Box<dyn RasterSurface>)
        })
    }

    /// Find the face for a family string: the named families in order, then
    /// sans-serif, then any face at all
    fn resolve(&mut self, family: &str) -> Option<ID> {
        if let Some(id) = self.faces.get(family) {
            return *id;
        }

        let names = parse_families(family);
        let mut families: Vec<Family> = names.iter().map(|name| to_family(name)).collect();
        families.push(Family::SansSerif);

        let id = self
            .fonts
            .query(&Query { families: &families, ..Query::default() })
            .or_else(|| self.fonts.faces().next().map(|face| face.id));

        if id.is_none() {
            tracing::warn!("No font face available for family '{}'", family);
        }
        self.faces.insert(family.to_string(), id);
        id
    }
}

impl RasterSurface for SkiaSurface {
    fn size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    fn ensure_size(&mut self, min: u32) {
        let (w, h) = self.size();
        if min <= w && min <= h {
            return;
        }

        let (new_w, new_h) = (w.max(min), h.max(min));
        match Pixmap::new(new_w, new_h) {
            Some(pixmap) => {
                tracing::debug!("Surface grow {}x{} -> {}x{}", w, h, new_w, new_h);
                self.pixmap = pixmap;
            }
            None => tracing::warn!("Cannot grow surface to {}x{}", new_w, new_h),
        }
    }

    fn clear(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
    }

    fn fill_char(&mut self, font: &FontRecord, size: f32, ch: char, x: f32, baseline: f32) {
        let Some(id) = self.resolve(&font.family) else {
            return;
        };

        let path = self.fonts.with_face_data(id, |data, index| {
            let face = Face::parse(data, index).ok()?;
            let glyph = face.glyph_index(ch).unwrap_or(GlyphId(0));
            let scale = size / face.units_per_em() as f32;

            let mut builder = OutlinePath::new(scale, x, baseline);
            face.outline_glyph(glyph, &mut builder)?;
            builder.finish()
        });
        let Some(Some(path)) = path else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color(Color::WHITE);
        paint.anti_alias = true;

        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    fn measure_char(&mut self, font: &FontRecord, size: f32, ch: char) -> CharMetrics {
        let Some(id) = self.resolve(&font.family) else {
            return CharMetrics::default();
        };

        self.fonts
            .with_face_data(id, |data, index| {
                let face = Face::parse(data, index).ok()?;
                let glyph = face.glyph_index(ch).unwrap_or(GlyphId(0));
                let scale = size / face.units_per_em() as f32;

                let advance = face.glyph_hor_advance(glyph).unwrap_or(0) as f32 * scale;
                let bbox = face.glyph_bounding_box(glyph);

                Some(CharMetrics {
                    advance,
                    bbox_left: bbox.map(|b| -(b.x_min as f32) * scale),
                    bbox_right: bbox.map(|b| b.x_max as f32 * scale),
                    ascent: bbox.map(|b| b.y_max as f32 * scale),
                    descent: bbox.map(|b| -(b.y_min as f32) * scale),
                })
            })
            .flatten()
            .unwrap_or_default()
    }

    fn read_rgba(&self, width: u32, height: u32) -> Vec<u8> {
        let (w, h) = self.size();
        let (width, height) = (width.min(w), height.min(h));
        let pixels = self.pixmap.pixels();

        let mut out = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            let row = (y * w) as usize;
            for px in &pixels[row..row + width as usize] {
                let c = px.demultiply();
                out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
            }
        }
        out
    }
}

/// Split a CSS-style family list (`"Noto Sans", serif`) into names
fn parse_families(family: &str) -> Vec<&str> {
    family
        .split(',')
        .map(|name| name.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|name| !name.is_empty())
        .collect()
}

fn to_family(name: &str) -> Family<'_> {
    match name.to_ascii_lowercase().as_str() {
        "serif" => Family::Serif,
        "sans-serif" => Family::SansSerif,
        "monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        _ => Family::Name(name),
    }
}

/// Converts ttf-parser outlines to a tiny-skia path with the pen at `origin_x`
/// and the baseline at `baseline` (font units scaled, Y flipped)
struct OutlinePath {
    builder: tiny_skia::PathBuilder,
    scale: f32,
    origin_x: f32,
    baseline: f32,
}

impl OutlinePath {
    fn new(scale: f32, origin_x: f32, baseline: f32) -> Self {
        Self {
            builder: tiny_skia::PathBuilder::new(),
            scale,
            origin_x,
            baseline,
        }
    }

    fn transform_x(&self, x: f32) -> f32 {
        self.origin_x + x * self.scale
    }

    fn transform_y(&self, y: f32) -> f32 {
        self.baseline - y * self.scale
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for OutlinePath {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(self.transform_x(x), self.transform_y(y));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(self.transform_x(x), self.transform_y(y));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.transform_x(x1), self.transform_y(y1),
            self.transform_x(x), self.transform_y(y),
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.transform_x(x1), self.transform_y(y1),
            self.transform_x(x2), self.transform_y(y2),
            self.transform_x(x), self.transform_y(y),
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_surface(size: u32) -> SkiaSurface {
        SkiaSurface::new(Arc::new(Database::new()), size).unwrap()
    }

    fn font() -> FontRecord {
        FontRecord { id: 1, family: "Test".into(), nominal_size: 16.0 }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(SkiaSurface::new(Arc::new(Database::new()), 0).is_none());
    }

    #[test]
    fn test_grow_never_shrinks() {
        let mut surface = empty_surface(32);
        surface.ensure_size(16);
        assert_eq!(surface.size(), (32, 32));
        surface.ensure_size(48);
        assert_eq!(surface.size(), (48, 48));
    }

    #[test]
    fn test_read_rgba_clamped() {
        let surface = empty_surface(8);
        assert_eq!(surface.read_rgba(4, 2).len(), 4 * 2 * 4);
        assert_eq!(surface.read_rgba(100, 100).len(), 8 * 8 * 4);
    }

    #[test]
    fn test_no_faces_draws_nothing() {
        let mut surface = empty_surface(32);
        surface.fill_char(&font(), 16.0, 'A', 4.0, 16.0);
        assert!(surface.read_rgba(32, 32).iter().all(|&b| b == 0));
        assert_eq!(surface.measure_char(&font(), 16.0, 'A'), CharMetrics::default());
    }

    #[test]
    fn test_outline_fill_demultiplied() {
        let mut surface = empty_surface(16);

        // 4x4 unit square, scale 1, pen at x=2, baseline at y=10
        let mut outline = OutlinePath::new(1.0, 2.0, 10.0);
        outline.move_to(0.0, 0.0);
        outline.line_to(4.0, 0.0);
        outline.line_to(4.0, 4.0);
        outline.line_to(0.0, 4.0);
        outline.close();
        let path = outline.finish().unwrap();

        let mut paint = Paint::default();
        paint.set_color(Color::WHITE);
        surface
            .pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

        let rgba = surface.read_rgba(16, 16);
        let at = |x: usize, y: usize| &rgba[(y * 16 + x) * 4..(y * 16 + x) * 4 + 4];
        assert_eq!(at(3, 7), &[255, 255, 255, 255]);
        assert_eq!(at(0, 0), &[0, 0, 0, 0]);
        assert_eq!(at(3, 11), &[0, 0, 0, 0]);

        surface.clear();
        assert!(surface.read_rgba(16, 16).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_families() {
        assert_eq!(
            parse_families("\"Noto Sans\", 'PingFang SC' ,serif"),
            vec!["Noto Sans", "PingFang SC", "serif"]
        );
        assert!(parse_families(" , ").is_empty());
    }

    #[test]
    fn test_generic_families() {
        assert_eq!(to_family("Monospace"), Family::Monospace);
        assert_eq!(to_family("sans-serif"), Family::SansSerif);
        assert_eq!(to_family("Arial"), Family::Name("Arial"));
    }
}
