//! Per-frame render-list construction.
//!
//! The builder walks the visible tile window in two perpendicular diagonal
//! scan passes, classifies every object into one of four category lists, runs
//! the foliage fade, and feeds candidate light sources to the light buffer.
//! Lists are index arrays rebuilt from scratch every frame; nothing here owns
//! an object.

use crate::math::{self, TilePos, Vec2};
use crate::profile::ProfileSnapshot;
use crate::render::light::LightBuffer;
use crate::viewport::{Camera, TileWindow};
use crate::world::{ObjHandle, ObjKind, World};

/// Alpha a fading foliage tile converges to while it covers the player.
pub const FOLIAGE_ALPHA_TARGET: u8 = 76;

/// Period of the foliage alpha timer.
const ALPHA_PERIOD_MS: u64 = 100;

/// Largest alpha change applied per alpha tick.
const ALPHA_STEP: u8 = 25;

/// The four render-list categories, in draw order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderCategory {
    /// Opaque land, statics, multis, and items.
    Statics,
    /// Mobiles and the player.
    Animated,
    /// One-shot effects.
    Effects,
    /// Alpha-blended objects, drawn last with depth testing.
    Transparent,
}

impl RenderCategory {
    pub const ALL: [RenderCategory; 4] = [
        RenderCategory::Statics,
        RenderCategory::Animated,
        RenderCategory::Effects,
        RenderCategory::Transparent,
    ];

    pub fn index(self) -> usize {
        match self {
            RenderCategory::Statics => 0,
            RenderCategory::Animated => 1,
            RenderCategory::Effects => 2,
            RenderCategory::Transparent => 3,
        }
    }
}

/// One queued draw: object handle plus everything resolved at build time.
#[derive(Clone, Copy, Debug)]
pub struct DrawEntry {
    pub handle: ObjHandle,
    pub graphic: u16,
    pub hue: u16,
    pub alpha: u8,
    pub depth: i32,
    pub screen: Vec2,
}

/// The four per-frame category lists.
#[derive(Default)]
pub struct RenderLists {
    lists: [Vec<DrawEntry>; 4],
}

impl RenderLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    pub fn entries(&self, category: RenderCategory) -> &[DrawEntry] {
        &self.lists[category.index()]
    }

    /// Entries of a category in draw order.
    ///
    /// The original intrusive lists inserted at the head, so draw order is
    /// reverse visitation order; depth testing resolves the rest.
    pub fn draw_order(&self, category: RenderCategory) -> impl Iterator<Item = &DrawEntry> {
        self.lists[category.index()].iter().rev()
    }

    pub fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    fn push(&mut self, category: RenderCategory, entry: DrawEntry) {
        self.lists[category.index()].push(entry);
    }
}

/// Counters for one build, exposed as frame diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub tiles_visited: usize,
    pub objects_queued: [usize; 4],
    pub lights_queued: usize,
}

/// Builds the frame's render lists.
///
/// Owns the rotating foliage index and the alpha timer, which persist across
/// frames; everything else is rebuilt per call.
pub struct RenderListBuilder {
    foliage_index: u8,
    next_alpha_at: u64,
    scratch: Vec<ObjHandle>,
}

impl RenderListBuilder {
    pub fn new() -> Self {
        Self {
            foliage_index: 1,
            next_alpha_at: 0,
            scratch: Vec::new(),
        }
    }

    pub fn build(
        &mut self,
        world: &mut World,
        camera: &Camera,
        window: &TileWindow,
        profile: &ProfileSnapshot,
        lists: &mut RenderLists,
        lights: &mut LightBuffer,
        now: u64,
    ) -> BuildStats {
        lists.clear();
        let mut stats = BuildStats::default();

        let player = match (world.in_game, world.player_pos()) {
            (true, Some(pos)) if !window.is_empty() => pos,
            _ => return stats,
        };

        self.foliage_index += 1;
        if self.foliage_index > 99 {
            self.foliage_index = 1;
        }
        let alpha_tick = now >= self.next_alpha_at;
        if alpha_tick {
            self.next_alpha_at = now + ALPHA_PERIOD_MS;
        }

        // Two perpendicular passes: diagonals anchored on the west edge, then
        // the remaining diagonals anchored on the south edge. Each diagonal
        // zig-zags x increasing, y decreasing, so visitation order is
        // back-to-front regardless of how tiles are stored.
        for pass in 0..2 {
            let (leads, from_west) = if pass == 0 {
                (window.min_y..=window.max_y, true)
            } else {
                ((window.min_x + 1)..=window.max_x, false)
            };
            for lead in leads {
                let (mut x, mut y) = if from_west {
                    (window.min_x, lead)
                } else {
                    (lead, window.max_y)
                };
                while x <= window.max_x && y >= window.min_y {
                    self.visit_tile(
                        world, camera, window, profile, lists, lights, &mut stats, player,
                        alpha_tick, x, y,
                    );
                    x += 1;
                    y -= 1;
                }
            }
        }

        stats
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_tile(
        &mut self,
        world: &mut World,
        camera: &Camera,
        window: &TileWindow,
        profile: &ProfileSnapshot,
        lists: &mut RenderLists,
        lights: &mut LightBuffer,
        stats: &mut BuildStats,
        player: TilePos,
        alpha_tick: bool,
        x: i32,
        y: i32,
    ) {
        stats.tiles_visited += 1;
        self.scratch.clear();
        self.scratch.extend_from_slice(world.column(x, y));

        for i in 0..self.scratch.len() {
            let handle = self.scratch[i];
            let (caps, pos, is_foliage) = match world.get(handle) {
                Some(obj) => {
                    let caps = world.data_of(obj).caps;
                    (caps, obj.pos, caps.foliage)
                }
                None => continue,
            };

            if !caps.drawable {
                continue;
            }
            // Roofs and ceilings above the player never enter a list.
            if pos.z > window.max_ground_z {
                continue;
            }

            if is_foliage {
                self.update_foliage(world, handle, player, window, alpha_tick);
            }

            let obj = match world.get(handle) {
                Some(obj) => obj,
                None => continue,
            };
            if let ObjKind::Mobile(mobile) = &obj.kind {
                if mobile.hidden {
                    continue;
                }
            }

            let category = classify(&obj.kind, caps.transparent, obj.alpha);
            let bias = depth_bias(&obj.kind);
            let screen = camera.world_to_screen(player, obj.pos);
            let entry = DrawEntry {
                handle,
                graphic: obj.graphic,
                hue: obj.hue,
                alpha: obj.alpha,
                depth: math::depth_key(obj.pos, bias),
                screen,
            };
            let casts_light = caps.light_source || obj.light_id != 0;

            lists.push(category, entry);
            stats.objects_queued[category.index()] += 1;

            if casts_light {
                let before = lights.len();
                lights.add_light(world, profile, handle, handle, screen);
                stats.lights_queued += lights.len() - before;
            }
        }
    }

    /// Marks foliage covering the player with the current fade cluster and
    /// steps its alpha toward the frame's target.
    fn update_foliage(
        &mut self,
        world: &mut World,
        handle: ObjHandle,
        player: TilePos,
        window: &TileWindow,
        alpha_tick: bool,
    ) {
        let current = self.foliage_index;
        if let Some(obj) = world.get_mut(handle) {
            let dx = obj.pos.x - player.x;
            let dy = obj.pos.y - player.y;
            let covering = dx >= 0 && dy >= 0 && dx + dy <= 2 && obj.pos.z >= player.z;
            if covering {
                obj.foliage_index = current;
            }
            if alpha_tick {
                let target = if obj.foliage_index == current && obj.pos.z <= window.max_ground_z {
                    FOLIAGE_ALPHA_TARGET
                } else {
                    255
                };
                obj.alpha = math::approach(obj.alpha, target, ALPHA_STEP);
            }
        }
    }
}

impl Default for RenderListBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(kind: &ObjKind, transparent: bool, alpha: u8) -> RenderCategory {
    match kind {
        ObjKind::Effect => RenderCategory::Effects,
        ObjKind::Mobile(_) => RenderCategory::Animated,
        _ if transparent || alpha < 255 => RenderCategory::Transparent,
        _ => RenderCategory::Statics,
    }
}

fn depth_bias(kind: &ObjKind) -> i32 {
    match kind {
        ObjKind::Land => 0,
        ObjKind::Static | ObjKind::Multi | ObjKind::Item { .. } => 1,
        ObjKind::Mobile(_) | ObjKind::Effect => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Rect;
    use crate::world::{Capabilities, GameObject, Serial, TileData};

    const LAND: u16 = 0x0003;
    const STONE: u16 = 0x0100;
    const TREE: u16 = 0x0CE0;
    const TORCH: u16 = 0x0F6B;
    const GLASS: u16 = 0x0200;

    fn test_world() -> World {
        let mut world = World::new();
        world.in_game = true;
        world.tiledata.insert(
            LAND,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    surface: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        world.tiledata.insert(
            STONE,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    impassable: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        world.tiledata.insert(
            TREE,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    foliage: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
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
            GLASS,
            TileData {
                caps: Capabilities {
                    drawable: true,
                    transparent: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        let player = world.insert(GameObject::new(
            0x0190,
            TilePos::new(100, 100, 0),
            ObjKind::Mobile(Default::default()),
        ));
        world.set_player(player);
        world
    }

    fn camera() -> Camera {
        Camera::new(Rect::new(0.0, 0.0, 800.0, 600.0))
    }

    fn small_window(player: TilePos) -> TileWindow {
        TileWindow {
            min_x: player.x - 5,
            min_y: player.y - 5,
            max_x: player.x + 5,
            max_y: player.y + 5,
            max_ground_z: player.z + 16,
        }
    }

    fn build_once(
        builder: &mut RenderListBuilder,
        world: &mut World,
        lists: &mut RenderLists,
        lights: &mut LightBuffer,
        now: u64,
    ) -> BuildStats {
        let window = small_window(world.player_pos().unwrap());
        let profile = ProfileSnapshot::default();
        builder.build(world, &camera(), &window, &profile, lists, lights, now)
    }

    #[test]
    fn categories_partition_visible_objects() {
        let mut world = test_world();
        world.insert(GameObject::new(LAND, TilePos::new(100, 100, 0), ObjKind::Land));
        world.insert(GameObject::new(
            STONE,
            TilePos::new(101, 100, 0),
            ObjKind::Static,
        ));
        world.insert(GameObject::new(
            GLASS,
            TilePos::new(102, 100, 0),
            ObjKind::Static,
        ));
        world.insert(GameObject::new(
            0x36D4,
            TilePos::new(99, 100, 0),
            ObjKind::Effect,
        ));

        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        let stats = build_once(
            &mut RenderListBuilder::new(),
            &mut world,
            &mut lists,
            &mut lights,
            0,
        );

        // Player + land + stone + glass + effect, each in exactly one list.
        assert_eq!(lists.total(), 5);
        assert_eq!(lists.entries(RenderCategory::Statics).len(), 2);
        assert_eq!(lists.entries(RenderCategory::Animated).len(), 1);
        assert_eq!(lists.entries(RenderCategory::Effects).len(), 1);
        assert_eq!(lists.entries(RenderCategory::Transparent).len(), 1);
        assert_eq!(stats.objects_queued.iter().sum::<usize>(), lists.total());

        let mut seen = std::collections::HashSet::new();
        for category in RenderCategory::ALL {
            for entry in lists.entries(category) {
                assert!(seen.insert(entry.handle), "object queued twice");
            }
        }
    }

    #[test]
    fn every_tile_in_the_window_is_visited_once() {
        let mut world = test_world();
        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        let stats = build_once(
            &mut RenderListBuilder::new(),
            &mut world,
            &mut lists,
            &mut lights,
            0,
        );
        let window = small_window(world.player_pos().unwrap());
        assert_eq!(
            stats.tiles_visited,
            (window.width() * window.height()) as usize
        );
    }

    #[test]
    fn roof_tiles_above_the_player_are_culled() {
        let mut world = test_world();
        world.insert(GameObject::new(
            STONE,
            TilePos::new(100, 101, 40),
            ObjKind::Static,
        ));
        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        build_once(
            &mut RenderListBuilder::new(),
            &mut world,
            &mut lists,
            &mut lights,
            0,
        );
        // Only the player made it in.
        assert_eq!(lists.total(), 1);
    }

    #[test]
    fn not_in_game_resets_the_lists() {
        let mut world = test_world();
        world.insert(GameObject::new(LAND, TilePos::new(100, 100, 0), ObjKind::Land));
        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        let mut builder = RenderListBuilder::new();
        build_once(&mut builder, &mut world, &mut lists, &mut lights, 0);
        assert!(lists.total() > 0);

        world.in_game = false;
        let window = small_window(TilePos::new(100, 100, 0));
        let profile = ProfileSnapshot::default();
        let stats = builder.build(
            &mut world,
            &camera(),
            &window,
            &profile,
            &mut lists,
            &mut lights,
            100,
        );
        assert_eq!(lists.total(), 0);
        assert_eq!(stats, BuildStats::default());
    }

    #[test]
    fn torch_on_a_tile_adds_one_light_at_its_projection() {
        let mut world = test_world();
        world.insert(
            GameObject::new(
                TORCH,
                TilePos::new(101, 101, 0),
                ObjKind::Item {
                    amount: 1,
                    container: None,
                    is_corpse: false,
                },
            )
            .with_serial(Serial(0x4000_0010)),
        );
        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        let stats = build_once(
            &mut RenderListBuilder::new(),
            &mut world,
            &mut lists,
            &mut lights,
            0,
        );
        assert_eq!(stats.lights_queued, 1);
        assert_eq!(lights.len(), 1);
        let expected = camera().world_to_screen(TilePos::new(100, 100, 0), TilePos::new(101, 101, 0));
        let light = lights.entries()[0];
        assert_eq!(light.shape, 6);
        assert_eq!((light.x, light.y), (expected.x, expected.y));
    }

    #[test]
    fn foliage_fades_monotonically_without_overshoot() {
        let mut world = test_world();
        let tree = world.insert(GameObject::new(
            TREE,
            TilePos::new(101, 101, 0),
            ObjKind::Static,
        ));
        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        let mut builder = RenderListBuilder::new();

        let mut last = 255u8;
        let mut now = 0u64;
        for _ in 0..12 {
            build_once(&mut builder, &mut world, &mut lists, &mut lights, now);
            lights.clear();
            let alpha = world.get(tree).unwrap().alpha;
            assert!(alpha <= last, "fade must be monotonic");
            assert!(alpha >= FOLIAGE_ALPHA_TARGET, "fade must not overshoot");
            last = alpha;
            now += 100;
        }
        assert_eq!(last, FOLIAGE_ALPHA_TARGET);

        // Step out from under the canopy: alpha climbs back to opaque.
        let player = world.player().unwrap();
        world.relocate(player, TilePos::new(90, 90, 0));
        let mut rising = FOLIAGE_ALPHA_TARGET;
        for _ in 0..12 {
            build_once(&mut builder, &mut world, &mut lists, &mut lights, now);
            lights.clear();
            let alpha = world.get(tree).unwrap().alpha;
            assert!(alpha >= rising);
            rising = alpha;
            now += 100;
        }
        assert_eq!(rising, 255);
    }

    #[test]
    fn faded_foliage_moves_to_the_transparent_list() {
        let mut world = test_world();
        world.insert(GameObject::new(
            TREE,
            TilePos::new(101, 101, 0),
            ObjKind::Static,
        ));
        let mut lists = RenderLists::new();
        let mut lights = LightBuffer::new();
        let mut builder = RenderListBuilder::new();
        let mut now = 0;
        for _ in 0..10 {
            build_once(&mut builder, &mut world, &mut lists, &mut lights, now);
            now += 100;
        }
        assert_eq!(lists.entries(RenderCategory::Transparent).len(), 1);
    }
}
