use std::collections::HashMap;

use ab_glyph::{Font, FontArc, Glyph, ScaleFont};
use anyhow::{anyhow, Result};

use crate::math::Vec2;
use crate::render::TextureHandle;

/// A font loaded and ready for text rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FontHandle(pub(crate) u32);

/// One rasterized glyph: its texture plus layout metrics.
pub struct GlyphEntry {
    pub texture: TextureHandle,
    pub width: f32,
    pub height: f32,
    pub bearing_x: f32,
    pub bearing_y: f32,
    pub advance: f32,
}

/// A positioned glyph quad ready for the overlay pass.
pub struct GlyphQuad {
    pub texture: TextureHandle,
    pub position: Vec2,
    pub size: Vec2,
}

/// Rasterizes and caches glyphs for overhead text, nameplates, and the death
/// message.
///
/// Rasterization goes through a caller-supplied texture upload so this type
/// stays independent of the GPU device.
pub struct TextRenderer {
    fonts: HashMap<FontHandle, FontArc>,
    next_font_id: u32,
    cache: HashMap<(FontHandle, char, u32), GlyphEntry>,
}

impl TextRenderer {
    pub fn new() -> Self {
        Self {
            fonts: HashMap::new(),
            next_font_id: 1,
            cache: HashMap::new(),
        }
    }

    /// Load a font from bytes (TTF/OTF format).
    pub fn load_font_from_bytes(&mut self, bytes: &[u8]) -> Result<FontHandle> {
        let font = FontArc::try_from_vec(bytes.to_vec())
            .map_err(|e| anyhow!("failed to load font: {}", e))?;
        let handle = FontHandle(self.next_font_id);
        self.next_font_id += 1;
        self.fonts.insert(handle, font);
        Ok(handle)
    }

    /// Width of a line at the given size, rasterizing nothing.
    pub fn measure(&self, font: FontHandle, text: &str, size: f32) -> f32 {
        let font = match self.fonts.get(&font) {
            Some(font) => font,
            None => return 0.0,
        };
        let scaled = font.as_scaled(ab_glyph::PxScale::from(size));
        text.chars()
            .map(|ch| scaled.h_advance(font.glyph_id(ch)))
            .sum()
    }

    /// Lays out one line of text, rasterizing uncached glyphs through
    /// `upload`. Returns quads positioned relative to `origin` (baseline
    /// left).
    pub fn layout_line(
        &mut self,
        font_handle: FontHandle,
        text: &str,
        size: f32,
        origin: Vec2,
        mut upload: impl FnMut(&[u8], u32, u32) -> Result<TextureHandle>,
    ) -> Result<Vec<GlyphQuad>> {
        let mut quads = Vec::with_capacity(text.len());
        let mut pen_x = origin.x;
        for ch in text.chars() {
            self.ensure_cached(font_handle, ch, size, &mut upload)?;
            let entry = match self.cache.get(&(font_handle, ch, size as u32)) {
                Some(entry) => entry,
                // Whitespace and empty outlines advance the pen only.
                None => {
                    pen_x += self.fallback_advance(font_handle, ch, size);
                    continue;
                }
            };
            quads.push(GlyphQuad {
                texture: entry.texture,
                position: Vec2::new(pen_x + entry.bearing_x, origin.y - entry.bearing_y),
                size: Vec2::new(entry.width, entry.height),
            });
            pen_x += entry.advance;
        }
        Ok(quads)
    }

    fn fallback_advance(&self, font_handle: FontHandle, ch: char, size: f32) -> f32 {
        self.fonts
            .get(&font_handle)
            .map(|font| {
                font.as_scaled(ab_glyph::PxScale::from(size))
                    .h_advance(font.glyph_id(ch))
            })
            .unwrap_or(0.0)
    }

    fn ensure_cached(
        &mut self,
        font_handle: FontHandle,
        ch: char,
        size: f32,
        upload: &mut impl FnMut(&[u8], u32, u32) -> Result<TextureHandle>,
    ) -> Result<()> {
        let key = (font_handle, ch, size as u32);
        if self.cache.contains_key(&key) {
            return Ok(());
        }
        let font = self
            .fonts
            .get(&font_handle)
            .ok_or_else(|| anyhow!("unknown font handle"))?;

        let scale = ab_glyph::PxScale::from(size);
        let scaled = font.as_scaled(scale);
        let glyph_id = font.glyph_id(ch);
        let glyph = Glyph {
            id: glyph_id,
            scale,
            position: ab_glyph::point(0.0, 0.0),
        };

        let outlined = match scaled.outline_glyph(glyph) {
            Some(outlined) => outlined,
            None => return Ok(()),
        };
        let bounds = outlined.px_bounds();
        let width = bounds.width().ceil() as u32;
        let height = bounds.height().ceil() as u32;
        if width == 0 || height == 0 {
            return Ok(());
        }

        let mut pixels = vec![0u8; (width * height * 4) as usize];
        outlined.draw(|x, y, coverage| {
            if x < width && y < height {
                let idx = ((y * width + x) * 4) as usize;
                pixels[idx] = 255;
                pixels[idx + 1] = 255;
                pixels[idx + 2] = 255;
                pixels[idx + 3] = (coverage * 255.0) as u8;
            }
        });

        let texture = upload(&pixels, width, height)?;
        self.cache.insert(
            key,
            GlyphEntry {
                texture,
                width: width as f32,
                height: height as f32,
                bearing_x: bounds.min.x,
                bearing_y: -bounds.min.y,
                advance: scaled.h_advance(glyph_id),
            },
        );
        Ok(())
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        Self::new()
    }
}
