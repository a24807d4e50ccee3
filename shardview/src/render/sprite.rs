use crate::math::{Rect, Vec2, TILE_STEP_Y};

/// Handle to a texture owned by the renderer backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

/// A drawable quad: texture, screen position, tint.
#[derive(Clone, Copy, Debug)]
pub struct Sprite {
    pub texture: TextureHandle,
    pub position: Vec2,
    pub tint: [f32; 4],
    /// Depth key for the world pass; ignored by screen-space passes.
    pub depth: f32,
}

impl Sprite {
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            position: Vec2::ZERO,
            tint: [1.0, 1.0, 1.0, 1.0],
            depth: 0.0,
        }
    }
}

/// Pixel dimensions of world art, supplied by the external asset layer.
///
/// The pipeline needs sizes for hit tests and bar anchoring long before any
/// texture is uploaded, so this is a separate, read-only interface.
pub trait ArtDimensions {
    fn size_of(&self, graphic: u16) -> (u32, u32);
}

/// Screen bounding box of a piece of art anchored at a tile.
///
/// The anchor is the top corner of the tile diamond; art is horizontally
/// centered on the diamond and bottom-aligned with it.
pub fn art_bounds(anchor: Vec2, size: (u32, u32)) -> Rect {
    let (w, h) = (size.0 as f32, size.1 as f32);
    Rect::new(
        anchor.x - w * 0.5,
        anchor.y + TILE_STEP_Y * 2.0 - h,
        w,
        h,
    )
}
