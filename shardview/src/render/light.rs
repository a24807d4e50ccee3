//! Dynamic light accumulation.
//!
//! Lights are gathered as a side effect of the tile walk, held in a bounded
//! buffer, drawn additively by the compositor, and cleared explicitly
//! afterward. Capacity overflow is a silent drop, never an error.

use crate::math::Vec2;
use crate::profile::ProfileSnapshot;
use crate::world::{ObjHandle, ObjKind, World};

/// Fixed capacity of the per-frame light buffer.
pub const MAX_LIGHTS: usize = 100;

/// Highest valid index into the light-shape sprite table.
pub const MAX_LIGHT_SHAPE: u8 = 63;

/// Shape id forced for lava- and fire-pot-style graphics.
const DRAMATIC_SHAPE: u8 = 2;

/// Shape id for mobiles that glow without carrying a light source.
const MOBILE_SHAPE: u8 = 5;

/// Light draw-position nudges for the five canonical facing octants of a
/// mobile carrying a light; the remaining three octants mirror across X.
const OCTANT_NUDGE: [(f32, f32); 5] = [
    (0.0, -22.0),
    (22.0, -14.0),
    (44.0, -6.0),
    (22.0, 2.0),
    (0.0, 10.0),
];

/// One accumulated light: shape sprite, resolved color, draw position.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightData {
    pub shape: u8,
    /// 0 means "no color"; non-zero values are stored offset by one.
    pub color: u16,
    /// Whether `color` indexes the hue table rather than the palette.
    pub is_hue: bool,
    pub x: f32,
    pub y: f32,
}

/// Bounded per-frame light array.
pub struct LightBuffer {
    entries: Vec<LightData>,
}

impl LightBuffer {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(MAX_LIGHTS),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LightData] {
        &self.entries
    }

    /// Resets the buffer. Called by the compositor after the light pass has
    /// consumed the frame's lights; the reset point is part of the contract.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Accumulates one light cast by `source` (carried or emitted by
    /// `caster`) at screen position `screen`.
    ///
    /// Rejections are silent: lighting disabled, buffer full, dead handles,
    /// occluded casters, and out-of-table shapes all simply add nothing.
    pub fn add_light(
        &mut self,
        world: &World,
        profile: &ProfileSnapshot,
        caster: ObjHandle,
        source: ObjHandle,
        screen: Vec2,
    ) {
        if !profile.lights_enabled || self.entries.len() >= MAX_LIGHTS {
            return;
        }
        let caster_obj = match world.get(caster) {
            Some(obj) => obj,
            None => return,
        };
        let source_obj = match world.get(source) {
            Some(obj) => obj,
            None => return,
        };

        if occluded(world, caster_obj.pos.x, caster_obj.pos.y, caster_obj.pos.z) {
            return;
        }

        let (mut shape, nudge) = resolve_shape(world, source_obj);
        let mut color = 0u16;
        let mut is_hue = false;

        if profile.colored_lights {
            if shape > 200 {
                color = shape as u16;
                shape = 1;
            }
            if let Some((hue, hue_flag)) = hue_override(source_obj.graphic) {
                color = hue;
                is_hue = hue_flag;
            }
        }

        if shape > MAX_LIGHT_SHAPE {
            return;
        }
        if color != 0 {
            // Offset stored colors by one so zero stays "uncolored".
            color += 1;
        }

        self.entries.push(LightData {
            shape,
            color,
            is_hue,
            x: screen.x + nudge.0,
            y: screen.y + nudge.1,
        });
    }
}

impl Default for LightBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Standing-wall occlusion heuristic: the tile diagonally toward the camera
/// from the caster blocks the light if it holds any opaque drawable whose Z
/// sits between the caster's ground level and five units above it.
///
/// This is deliberately not a visibility computation; it approximates the
/// common case of a light inside a walled room.
fn occluded(world: &World, x: i32, y: i32, ground_z: i32) -> bool {
    world
        .column(x + 1, y + 1)
        .iter()
        .filter_map(|&h| world.get(h))
        .any(|obj| {
            let caps = world.data_of(obj).caps;
            caps.drawable
                && !caps.transparent
                && obj.pos.z >= ground_z
                && obj.pos.z <= ground_z + 5
        })
}

/// Lava- and fire-pot-style graphics that always use the dramatic shape.
fn is_dramatic_graphic(graphic: u16) -> bool {
    matches!(graphic, 0x3E02..=0x3E0B | 0x3914..=0x3929) || graphic == 0x0B1D
}

/// Fixed hue overrides for specific light-emitting graphics.
fn hue_override(graphic: u16) -> Option<(u16, bool)> {
    match graphic {
        // Braziers and campfires burn warm.
        0x0DE3..=0x0DE9 | 0x0E31 => Some((0x0035, false)),
        // Glowing runes read from the hue table.
        0x1ECD..=0x1ECF => Some((0x0480, true)),
        _ => None,
    }
}

/// Resolves the light-shape id and a draw-position nudge for a source.
fn resolve_shape(world: &World, source: &crate::world::GameObject) -> (u8, (f32, f32)) {
    if is_dramatic_graphic(source.graphic) {
        return (DRAMATIC_SHAPE, (0.0, 0.0));
    }
    if source.light_id != 0 {
        return (source.light_id, (0.0, 0.0));
    }

    let data = world.data_of(source);
    match &source.kind {
        ObjKind::Mobile(mobile) => {
            if data.caps.light_source {
                // Carried lights hang off the sprite; nudge by facing octant,
                // mirroring the west-side octants.
                let index = mobile.facing.index();
                let (canonical, mirror) = if index <= 4 {
                    (index, false)
                } else {
                    (8 - index, true)
                };
                let (dx, dy) = OCTANT_NUDGE[canonical];
                (data.light_index, (if mirror { -dx } else { dx }, dy))
            } else {
                (MOBILE_SHAPE, (0.0, 0.0))
            }
        }
        _ => {
            if data.caps.light_source {
                (data.light_index, (0.0, 0.0))
            } else {
                // Terrain fallback: the layer doubles as a shape id.
                (data.layer, (0.0, 0.0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::TilePos;
    use crate::world::{Capabilities, GameObject, MobileData, TileData};

    const TORCH: u16 = 0x0F6B;
    const WALL: u16 = 0x0080;

    fn torch_world() -> (World, ObjHandle) {
        let mut world = World::new();
        world.in_game = true;
        world.tiledata.insert(
            TORCH,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    light_source: true,
                    ..Default::default()
                },
                light_index: 6,
                ..Default::default()
            },
        );
        world.tiledata.insert(
            WALL,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    impassable: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let torch = world.insert(GameObject::new(
            TORCH,
            TilePos::new(101, 101, 0),
            ObjKind::Item {
                amount: 1,
                container: None,
                is_corpse: false,
            },
        ));
        (world, torch)
    }

    #[test]
    fn torch_with_no_blocker_is_accepted() {
        let (world, torch) = torch_world();
        let profile = ProfileSnapshot::default();
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &profile, torch, torch, Vec2::new(320.0, 240.0));
        assert_eq!(lights.len(), 1);
        let light = lights.entries()[0];
        assert_eq!(light.shape, 6);
        assert_eq!(light.x, 320.0);
        assert_eq!(light.y, 240.0);
    }

    #[test]
    fn diagonal_blocker_occludes_and_its_removal_unblocks() {
        let (mut world, torch) = torch_world();
        let wall = world.insert(GameObject::new(
            WALL,
            TilePos::new(102, 102, 3),
            ObjKind::Static,
        ));
        let profile = ProfileSnapshot::default();
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &profile, torch, torch, Vec2::ZERO);
        assert!(lights.is_empty());

        world.remove(wall);
        lights.add_light(&world, &profile, torch, torch, Vec2::ZERO);
        assert_eq!(lights.len(), 1);
    }

    #[test]
    fn blocker_outside_the_z_band_does_not_occlude() {
        let (mut world, torch) = torch_world();
        world.insert(GameObject::new(
            WALL,
            TilePos::new(102, 102, 12),
            ObjKind::Static,
        ));
        let profile = ProfileSnapshot::default();
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &profile, torch, torch, Vec2::ZERO);
        assert_eq!(lights.len(), 1);
    }

    #[test]
    fn capacity_overflow_is_a_noop() {
        let (world, torch) = torch_world();
        let profile = ProfileSnapshot::default();
        let mut lights = LightBuffer::new();
        for i in 0..(MAX_LIGHTS + 10) {
            lights.add_light(&world, &profile, torch, torch, Vec2::new(i as f32, 0.0));
        }
        assert_eq!(lights.len(), MAX_LIGHTS);
        // Existing entries are untouched by rejected pushes.
        assert_eq!(lights.entries()[0].x, 0.0);
        assert_eq!(lights.entries()[MAX_LIGHTS - 1].x, (MAX_LIGHTS - 1) as f32);
    }

    #[test]
    fn disabled_lighting_rejects_everything() {
        let (world, torch) = torch_world();
        let mut profile = ProfileSnapshot::default();
        profile.lights_enabled = false;
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &profile, torch, torch, Vec2::ZERO);
        assert!(lights.is_empty());
    }

    #[test]
    fn dramatic_graphics_force_the_fixed_shape() {
        let mut world = World::new();
        let lava = world.insert(GameObject::new(
            0x3E05,
            TilePos::new(5, 5, 0),
            ObjKind::Static,
        ));
        let profile = ProfileSnapshot::default();
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &profile, lava, lava, Vec2::ZERO);
        assert_eq!(lights.entries()[0].shape, DRAMATIC_SHAPE);
    }

    #[test]
    fn colored_remap_reserves_zero_and_bounds_the_shape() {
        let mut world = World::new();
        // Self-lit object whose light id doubles as a color when colored
        // lights are on.
        let mut obj = GameObject::new(0x2000, TilePos::new(5, 5, 0), ObjKind::Static);
        obj.light_id = 220;
        let handle = world.insert(obj);

        let mut lights = LightBuffer::new();
        let profile = ProfileSnapshot::default();
        lights.add_light(&world, &profile, handle, handle, Vec2::ZERO);
        let light = lights.entries()[0];
        assert_eq!(light.shape, 1);
        assert_eq!(light.color, 221); // stored offset by one

        // With colored lights off the raw id overflows the sprite table and
        // the light is rejected instead.
        let mut plain = ProfileSnapshot::default();
        plain.colored_lights = false;
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &plain, handle, handle, Vec2::ZERO);
        assert!(lights.is_empty());
    }

    #[test]
    fn carried_light_nudges_by_facing() {
        let mut world = World::new();
        world.tiledata.insert(
            TORCH,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    light_source: true,
                    ..Default::default()
                },
                light_index: 6,
                ..Default::default()
            },
        );
        let mut mobile = MobileData::default();
        mobile.facing = crate::math::Direction::East; // octant 2
        let bearer = world.insert(GameObject::new(
            TORCH,
            TilePos::new(10, 10, 0),
            ObjKind::Mobile(mobile),
        ));
        let profile = ProfileSnapshot::default();
        let mut lights = LightBuffer::new();
        lights.add_light(&world, &profile, bearer, bearer, Vec2::new(100.0, 100.0));
        let light = lights.entries()[0];
        assert_eq!((light.x, light.y), (144.0, 94.0));
    }
}
