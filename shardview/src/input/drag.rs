//! Drag-select and item-hold drop handling.
//!
//! Drag-select attaches health-bar overlays to every mobile whose screen box
//! intersects the gesture rectangle, laying bars out in a start-corner grid
//! or, in anchor mode, stacking them under existing overlapping bars.
//! Item-hold drop resolves a release into the drop-target priority chain and
//! gates everything on the interaction distance.

use crate::action::{ActionQueue, ClientAction};
use crate::audio::{SoundCue, SoundPlayer};
use crate::input::InputState;
use crate::math::{Rect, TilePos, Vec2};
use crate::profile::{BarCorner, DragSelectModifier, ProfileSnapshot};
use crate::render::{art_bounds, ArtDimensions};
use crate::viewport::Camera;
use crate::world::{ObjHandle, ObjKind, Serial, World};

pub const BAR_WIDTH: f32 = 120.0;
pub const BAR_HEIGHT: f32 = 36.0;

/// The in-progress drag-select gesture.
#[derive(Clone, Copy, Debug, Default)]
pub struct DragSelect {
    active: bool,
    start: Vec2,
    current: Vec2,
}

impl DragSelect {
    pub fn begin(&mut self, at: Vec2) {
        self.active = true;
        self.start = at;
        self.current = at;
    }

    pub fn update(&mut self, at: Vec2) {
        if self.active {
            self.current = at;
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current selection rectangle, always normalized.
    pub fn rect(&self) -> Option<Rect> {
        self.active
            .then(|| Rect::from_corners(self.start, self.current))
    }

    /// Ends the gesture and returns the final rectangle.
    pub fn finish(&mut self) -> Option<Rect> {
        let rect = self.rect();
        self.active = false;
        rect
    }
}

/// Whether the configured drag-select modifier state is currently held.
pub fn modifier_satisfied(profile: &ProfileSnapshot, input: &InputState) -> bool {
    match profile.drag_select_modifier {
        DragSelectModifier::None => true,
        DragSelectModifier::Ctrl => input.ctrl() && !input.shift(),
        DragSelectModifier::Shift => input.shift() && !input.ctrl(),
        DragSelectModifier::CtrlShift => input.ctrl() && input.shift(),
    }
}

/// Objects a drag-select gesture may start over: ground tiles and items
/// nailed in place.
pub fn can_anchor_drag(world: &World, handle: ObjHandle) -> bool {
    match world.get(handle) {
        Some(obj) => match obj.kind {
            ObjKind::Land | ObjKind::Static | ObjKind::Multi => true,
            ObjKind::Item { .. } => world.data_of(obj).caps.impassable,
            _ => false,
        },
        None => false,
    }
}

/// One attached health-bar overlay.
#[derive(Clone, Copy, Debug)]
pub struct HealthBar {
    pub serial: Serial,
    pub rect: Rect,
}

/// Health-bar overlays attached by drag-select, in attach order.
#[derive(Default)]
pub struct HealthBarManager {
    bars: Vec<HealthBar>,
}

impl HealthBarManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, serial: Serial) -> bool {
        self.bars.iter().any(|bar| bar.serial == serial)
    }

    pub fn bars(&self) -> &[HealthBar] {
        &self.bars
    }

    pub fn remove(&mut self, serial: Serial) {
        self.bars.retain(|bar| bar.serial != serial);
    }

    fn attach(&mut self, serial: Serial, rect: Rect) {
        self.bars.push(HealthBar { serial, rect });
    }
}

/// Applies a finished drag-select rectangle: every mobile passing the
/// profile filters whose screen box intersects the rectangle gains a health
/// bar, laid out per the profile's corner/anchor settings.
pub fn apply_drag_select(
    rect: Rect,
    world: &World,
    camera: &Camera,
    art: &dyn ArtDimensions,
    profile: &ProfileSnapshot,
    bars: &mut HealthBarManager,
) {
    let player_pos = match world.player_pos() {
        Some(pos) => pos,
        None => return,
    };
    let player_handle = world.player();

    // World iteration order is arena order; sort by serial so bar layout is
    // deterministic for a given selection.
    let mut selected: Vec<(Serial, ObjHandle)> = world
        .mobiles()
        .filter(|&(handle, _)| Some(handle) != player_handle)
        .filter_map(|(handle, obj)| obj.serial.map(|serial| (serial, handle)))
        .collect();
    selected.sort_by_key(|&(serial, _)| serial);

    for (serial, handle) in selected {
        let obj = match world.get(handle) {
            Some(obj) => obj,
            None => continue,
        };
        let mobile = match obj.mobile() {
            Some(mobile) => mobile,
            None => continue,
        };
        if mobile.hidden {
            continue;
        }
        if mobile.is_player_character && !profile.drag_select_players {
            continue;
        }
        if !mobile.is_player_character && !profile.drag_select_monsters {
            continue;
        }
        if profile.drag_select_named_only && mobile.name.is_empty() {
            continue;
        }

        let anchor = camera.world_to_screen(player_pos, obj.pos);
        let bounds = art_bounds(anchor, art.size_of(obj.graphic));
        if !rect.intersects(&bounds) {
            continue;
        }
        if bars.has(serial) {
            continue;
        }

        let placed = if profile.drag_select_anchor {
            place_anchored(bars, camera.bounds, profile.drag_select_corner)
        } else {
            place_grid(bars.bars.len(), camera.bounds, profile.drag_select_corner)
        };
        bars.attach(serial, placed);
    }
}

/// Fixed-grid placement: bars stack down from the start corner and wrap to a
/// new column when the next slot would overflow the viewport vertically.
fn place_grid(index: usize, bounds: Rect, corner: BarCorner) -> Rect {
    let rows = ((bounds.height / BAR_HEIGHT).floor() as usize).max(1);
    let row = index % rows;
    let col = index / rows;
    let y = bounds.y + row as f32 * BAR_HEIGHT;
    let x = match corner {
        BarCorner::TopLeft => bounds.x + col as f32 * BAR_WIDTH,
        BarCorner::TopRight => bounds.right() - BAR_WIDTH - col as f32 * BAR_WIDTH,
    };
    Rect::new(x, y, BAR_WIDTH, BAR_HEIGHT)
}

/// Anchor placement: start at the corner and, scanning already-placed bars
/// in attach order, step below the first overlapping bar; when that would
/// leave the viewport, step right of it and restart from the top.
///
/// The scan order is part of the observable layout; keep it.
fn place_anchored(bars: &HealthBarManager, bounds: Rect, corner: BarCorner) -> Rect {
    let start_x = match corner {
        BarCorner::TopLeft => bounds.x,
        BarCorner::TopRight => bounds.right() - BAR_WIDTH,
    };
    let mut rect = Rect::new(start_x, bounds.y, BAR_WIDTH, BAR_HEIGHT);
    loop {
        let overlapping = bars.bars.iter().find(|bar| bar.rect.intersects(&rect));
        match overlapping {
            None => return rect,
            Some(bar) => {
                if bar.rect.bottom() + BAR_HEIGHT <= bounds.bottom() {
                    rect.y = bar.rect.bottom();
                } else {
                    rect.x = bar.rect.right();
                    rect.y = bounds.y;
                }
            }
        }
    }
}

/// The cursor's item-hold state, owned by the cursor subsystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct ItemHold {
    pub enabled: bool,
    /// Fixed-position holds (opened from paperdoll slots) suppress dragging.
    pub fixed: bool,
    pub serial: Serial,
    pub graphic: u16,
    pub amount: u16,
}

/// Resolves an item-hold release into a drop action.
///
/// Priority: equip on self under Ctrl; container or mobile under the cursor
/// (drop into by serial); a stackable or surface item (drop onto it, raised
/// by its height when it is a surface); ground/static/multi tile (drop at the
/// tile, raised by the surface height). Anything farther than the drop
/// distance, or resolving to nothing, is rejected with a feedback cue and no
/// action.
#[allow(clippy::too_many_arguments)]
pub fn resolve_drop(
    world: &World,
    hold: &ItemHold,
    target: Option<ObjHandle>,
    ctrl_held: bool,
    profile: &ProfileSnapshot,
    actions: &mut ActionQueue,
    sounds: &mut dyn SoundPlayer,
) {
    if !hold.enabled {
        return;
    }
    if ctrl_held {
        actions.push(ClientAction::EquipSelf {
            serial: hold.serial,
        });
        return;
    }

    let target_obj = target.and_then(|handle| world.get(handle));
    let target_obj = match target_obj {
        Some(obj) => obj,
        None => {
            sounds.play(SoundCue::DropFailed);
            return;
        }
    };

    if world.distance_from_player(target_obj.pos) > profile.drop_distance {
        sounds.play(SoundCue::DropFailed);
        return;
    }

    let data = world.data_of(target_obj);
    match (&target_obj.kind, target_obj.serial) {
        (ObjKind::Mobile(_), Some(container)) => {
            actions.push(ClientAction::DropInto {
                serial: hold.serial,
                container,
            });
            actions_drop_feedback(sounds);
        }
        (ObjKind::Item { .. }, Some(container)) if data.caps.container => {
            actions.push(ClientAction::DropInto {
                serial: hold.serial,
                container,
            });
            actions_drop_feedback(sounds);
        }
        (ObjKind::Item { .. }, _) if data.caps.stackable || data.caps.surface => {
            let pos = target_obj.pos;
            let z = if data.caps.surface && data.height > 0 {
                pos.z + data.height
            } else {
                pos.z
            };
            actions.push(ClientAction::DropAt {
                serial: hold.serial,
                x: pos.x,
                y: pos.y,
                z,
            });
            actions_drop_feedback(sounds);
        }
        (ObjKind::Land | ObjKind::Static | ObjKind::Multi, _) => {
            let pos = target_obj.pos;
            actions.push(ClientAction::DropAt {
                serial: hold.serial,
                x: pos.x,
                y: pos.y,
                z: pos.z + data.height,
            });
            actions_drop_feedback(sounds);
        }
        _ => {
            sounds.play(SoundCue::DropFailed);
        }
    }
}

fn actions_drop_feedback(sounds: &mut dyn SoundPlayer) {
    sounds.play(SoundCue::DropItem);
}

/// Convenience for tests and the scene: drop position of a tile release.
pub fn tile_pos_of(world: &World, handle: ObjHandle) -> Option<TilePos> {
    world.get(handle).map(|obj| obj.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingSoundPlayer;
    use crate::world::{Capabilities, GameObject, MobileData, TileData};

    struct FixedArt(u32, u32);

    impl ArtDimensions for FixedArt {
        fn size_of(&self, _graphic: u16) -> (u32, u32) {
            (self.0, self.1)
        }
    }

    fn selectable_world() -> World {
        let mut world = World::new();
        world.in_game = true;
        let player = world.insert(GameObject::new(
            0x0190,
            TilePos::new(100, 100, 0),
            ObjKind::Mobile(MobileData::default()),
        ));
        world.set_player(player);
        world
    }

    fn spawn_mobile(world: &mut World, serial: u32, pos: TilePos, is_player: bool) {
        let mut mobile = MobileData::default();
        mobile.is_player_character = is_player;
        mobile.name = "target".into();
        world.insert(
            GameObject::new(0x0190, pos, ObjKind::Mobile(mobile)).with_serial(Serial(serial)),
        );
    }

    fn default_camera() -> Camera {
        Camera::new(Rect::new(0.0, 0.0, 800.0, 600.0))
    }

    #[test]
    fn selection_is_order_independent() {
        let mut world = selectable_world();
        spawn_mobile(&mut world, 1, TilePos::new(101, 100, 0), false);
        spawn_mobile(&mut world, 2, TilePos::new(100, 101, 0), false);
        let camera = default_camera();
        let art = FixedArt(40, 60);
        let profile = ProfileSnapshot::default();

        let a = Vec2::new(200.0, 150.0);
        let b = Vec2::new(600.0, 450.0);

        let mut forward = HealthBarManager::new();
        apply_drag_select(
            Rect::from_corners(a, b),
            &world,
            &camera,
            &art,
            &profile,
            &mut forward,
        );
        let mut backward = HealthBarManager::new();
        apply_drag_select(
            Rect::from_corners(b, a),
            &world,
            &camera,
            &art,
            &profile,
            &mut backward,
        );

        let serials = |bars: &HealthBarManager| {
            bars.bars().iter().map(|bar| bar.serial).collect::<Vec<_>>()
        };
        assert_eq!(serials(&forward), serials(&backward));
        assert_eq!(forward.bars().len(), 2);
    }

    #[test]
    fn monster_filter_without_players_selects_only_monsters() {
        let mut world = selectable_world();
        spawn_mobile(&mut world, 1, TilePos::new(101, 100, 0), false);
        spawn_mobile(&mut world, 2, TilePos::new(100, 101, 0), false);
        spawn_mobile(&mut world, 3, TilePos::new(101, 101, 0), true);
        let camera = default_camera();
        let art = FixedArt(40, 60);
        let mut profile = ProfileSnapshot::default();
        profile.drag_select_players = false;
        profile.drag_select_monsters = true;

        let mut bars = HealthBarManager::new();
        apply_drag_select(
            Rect::new(0.0, 0.0, 800.0, 600.0),
            &world,
            &camera,
            &art,
            &profile,
            &mut bars,
        );

        assert_eq!(bars.bars().len(), 2);
        assert!(bars.has(Serial(1)));
        assert!(bars.has(Serial(2)));
        assert!(!bars.has(Serial(3)));

        // Bars start in the configured corner and never overlap.
        let first = bars.bars()[0].rect;
        assert_eq!((first.x, first.y), (0.0, 0.0));
        for (i, a) in bars.bars().iter().enumerate() {
            for b in &bars.bars()[i + 1..] {
                assert!(!a.rect.intersects(&b.rect));
            }
        }
    }

    #[test]
    fn grid_wraps_to_a_new_column_when_the_viewport_fills() {
        let bounds = Rect::new(0.0, 0.0, 800.0, BAR_HEIGHT * 2.5);
        let slots: Vec<Rect> = (0..3)
            .map(|i| place_grid(i, bounds, BarCorner::TopLeft))
            .collect();
        assert_eq!((slots[0].x, slots[0].y), (0.0, 0.0));
        assert_eq!((slots[1].x, slots[1].y), (0.0, BAR_HEIGHT));
        // Third bar would overflow vertically; it starts a new column.
        assert_eq!((slots[2].x, slots[2].y), (BAR_WIDTH, 0.0));
    }

    #[test]
    fn anchor_mode_stacks_below_overlapping_bars() {
        let bounds = Rect::new(0.0, 0.0, 800.0, 600.0);
        let mut bars = HealthBarManager::new();
        bars.attach(Serial(1), place_anchored(&bars, bounds, BarCorner::TopLeft));
        bars.attach(Serial(2), place_anchored(&bars, bounds, BarCorner::TopLeft));
        let rects: Vec<Rect> = bars.bars().iter().map(|b| b.rect).collect();
        assert_eq!((rects[0].x, rects[0].y), (0.0, 0.0));
        assert_eq!((rects[1].x, rects[1].y), (0.0, BAR_HEIGHT));
    }

    fn holding() -> ItemHold {
        ItemHold {
            enabled: true,
            fixed: false,
            serial: Serial(0x4000_0001),
            graphic: 0x0E75,
            amount: 1,
        }
    }

    #[test]
    fn drop_on_adjacent_mobile_targets_the_container_serial() {
        let mut world = selectable_world();
        spawn_mobile(&mut world, 0x77, TilePos::new(101, 100, 0), false);
        let target = world.by_serial(Serial(0x77)).unwrap();

        let mut actions = ActionQueue::new();
        let mut sounds = RecordingSoundPlayer::default();
        resolve_drop(
            &world,
            &holding(),
            Some(target),
            false,
            &ProfileSnapshot::default(),
            &mut actions,
            &mut sounds,
        );
        assert_eq!(
            actions.as_slice(),
            &[ClientAction::DropInto {
                serial: Serial(0x4000_0001),
                container: Serial(0x77),
            }]
        );
        assert_eq!(sounds.played, vec![SoundCue::DropItem]);
    }

    #[test]
    fn distant_drop_is_rejected_with_a_cue_and_no_action() {
        let mut world = selectable_world();
        world.insert(GameObject::new(
            0x0003,
            TilePos::new(120, 100, 0),
            ObjKind::Land,
        ));
        let target = world.column(120, 100)[0];

        let mut actions = ActionQueue::new();
        let mut sounds = RecordingSoundPlayer::default();
        resolve_drop(
            &world,
            &holding(),
            Some(target),
            false,
            &ProfileSnapshot::default(),
            &mut actions,
            &mut sounds,
        );
        assert!(actions.is_empty());
        assert_eq!(sounds.played, vec![SoundCue::DropFailed]);
    }

    #[test]
    fn drop_on_a_surface_item_is_raised_by_its_height() {
        let mut world = selectable_world();
        world.tiledata.insert(
            0x0B58, // table
            TileData {
                caps: Capabilities {
                    drawable: true,
                    surface: true,
                    ..Default::default()
                },
                height: 6,
                ..Default::default()
            },
        );
        world.insert(
            GameObject::new(
                0x0B58,
                TilePos::new(101, 101, 2),
                ObjKind::Item {
                    amount: 1,
                    container: None,
                    is_corpse: false,
                },
            )
            .with_serial(Serial(0x88)),
        );
        let target = world.by_serial(Serial(0x88)).unwrap();

        let mut actions = ActionQueue::new();
        let mut sounds = RecordingSoundPlayer::default();
        resolve_drop(
            &world,
            &holding(),
            Some(target),
            false,
            &ProfileSnapshot::default(),
            &mut actions,
            &mut sounds,
        );
        assert_eq!(
            actions.as_slice(),
            &[ClientAction::DropAt {
                serial: Serial(0x4000_0001),
                x: 101,
                y: 101,
                z: 8,
            }]
        );
    }

    #[test]
    fn ctrl_release_equips_on_self() {
        let world = selectable_world();
        let mut actions = ActionQueue::new();
        let mut sounds = RecordingSoundPlayer::default();
        resolve_drop(
            &world,
            &holding(),
            None,
            true,
            &ProfileSnapshot::default(),
            &mut actions,
            &mut sounds,
        );
        assert_eq!(
            actions.as_slice(),
            &[ClientAction::EquipSelf {
                serial: Serial(0x4000_0001),
            }]
        );
        assert!(sounds.played.is_empty());
    }

    #[test]
    fn release_over_nothing_is_a_rejection() {
        let world = selectable_world();
        let mut actions = ActionQueue::new();
        let mut sounds = RecordingSoundPlayer::default();
        resolve_drop(
            &world,
            &holding(),
            None,
            false,
            &ProfileSnapshot::default(),
            &mut actions,
            &mut sounds,
        );
        assert!(actions.is_empty());
        assert_eq!(sounds.played, vec![SoundCue::DropFailed]);
    }
}
