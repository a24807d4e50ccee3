mod compositor;
mod light;
mod lists;
mod sprite;
mod text;
mod wgpu_backend;

pub use compositor::{plan_frame, DeathOverlay, FramePlan, LightBlend, LightPass, WorldTarget};
pub use light::{LightBuffer, LightData, MAX_LIGHTS, MAX_LIGHT_SHAPE};
pub use lists::{
    BuildStats, DrawEntry, RenderCategory, RenderListBuilder, RenderLists, FOLIAGE_ALPHA_TARGET,
};
pub use sprite::{art_bounds, ArtDimensions, Sprite, TextureHandle};
pub use text::{FontHandle, GlyphQuad, TextRenderer};
pub use wgpu_backend::{Frame, Renderer};
