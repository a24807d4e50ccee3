use std::collections::HashMap;

use crate::math::{Direction, TilePos};

/// Unique network identifier for items and mobiles.
///
/// Land and static tiles have no serial; only entities the server tracks do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(pub u32);

/// Handle into the world's object arena.
///
/// Handles are plain indices; they stay valid until the object is removed.
/// Render lists rebuilt every frame never outlive the objects they reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjHandle(u32);

impl ObjHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static capability table for a graphic, derived from tile data.
///
/// Queried instead of runtime type tests: "can this thing be dropped on",
/// "does it block light", "is it vegetation" are all data, not types.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub drawable: bool,
    pub transparent: bool,
    pub surface: bool,
    pub container: bool,
    pub damageable: bool,
    pub foliage: bool,
    pub door: bool,
    pub stackable: bool,
    pub light_source: bool,
    pub roof: bool,
    pub impassable: bool,
}

/// Per-graphic tile data supplied by the external asset layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TileData {
    pub caps: Capabilities,
    /// Object height in Z units; surfaces raise dropped items by this much.
    pub height: i32,
    /// Index into the light-shape sprite table for light-casting graphics.
    pub light_index: u8,
    /// Equipment/terrain layer; doubles as the fallback light shape id.
    pub layer: u8,
}

/// Lookup table from graphic id to tile data.
///
/// The asset loader fills this at login; unknown graphics resolve to a
/// drawable, otherwise featureless entry.
#[derive(Default)]
pub struct TileDataTable {
    entries: HashMap<u16, TileData>,
    default: TileData,
}

impl TileDataTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default: TileData {
                caps: Capabilities {
                    drawable: true,
                    ..Capabilities::default()
                },
                ..TileData::default()
            },
        }
    }

    pub fn insert(&mut self, graphic: u16, data: TileData) {
        self.entries.insert(graphic, data);
    }

    pub fn get(&self, graphic: u16) -> &TileData {
        self.entries.get(&graphic).unwrap_or(&self.default)
    }
}

/// Mobile-specific state.
#[derive(Clone, Debug)]
pub struct MobileData {
    pub name: String,
    /// True for player characters, false for NPCs and monsters.
    pub is_player_character: bool,
    pub war_mode: bool,
    pub dead: bool,
    pub paralyzed: bool,
    pub hidden: bool,
    pub hp_percent: u8,
    pub facing: Direction,
}

impl Default for MobileData {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_player_character: false,
            war_mode: false,
            dead: false,
            paralyzed: false,
            hidden: false,
            hp_percent: 100,
            facing: Direction::South,
        }
    }
}

/// Closed set of object kinds the pipeline understands.
#[derive(Clone, Debug)]
pub enum ObjKind {
    Land,
    Static,
    /// Component of a multi-tile structure (house, boat).
    Multi,
    Item {
        amount: u16,
        /// Serial of the containing object, if held inside one.
        container: Option<Serial>,
        is_corpse: bool,
    },
    Mobile(MobileData),
    /// One-shot visual effect; never interactable.
    Effect,
}

impl ObjKind {
    pub fn is_mobile(&self) -> bool {
        matches!(self, ObjKind::Mobile(_))
    }

    pub fn is_item(&self) -> bool {
        matches!(self, ObjKind::Item { .. })
    }

    /// Land, static, and multi tiles are valid drag-select anchors and drop
    /// targets at ground level.
    pub fn is_ground(&self) -> bool {
        matches!(self, ObjKind::Land | ObjKind::Static | ObjKind::Multi)
    }
}

/// A world object: one entry in the arena.
#[derive(Clone, Debug)]
pub struct GameObject {
    pub serial: Option<Serial>,
    pub graphic: u16,
    pub hue: u16,
    pub pos: TilePos,
    /// 255 = opaque. Mutated by the foliage fade between frames.
    pub alpha: u8,
    /// Non-zero for self-lit graphics; overrides the tile-data light index.
    pub light_id: u8,
    /// Rotating fade-cluster mark for foliage covering the player; 0 when
    /// unmarked. Owned by the render-list builder.
    pub foliage_index: u8,
    pub kind: ObjKind,
}

impl GameObject {
    pub fn new(graphic: u16, pos: TilePos, kind: ObjKind) -> Self {
        Self {
            serial: None,
            graphic,
            hue: 0,
            pos,
            alpha: 255,
            light_id: 0,
            foliage_index: 0,
            kind,
        }
    }

    pub fn with_serial(mut self, serial: Serial) -> Self {
        self.serial = Some(serial);
        self
    }

    pub fn with_hue(mut self, hue: u16) -> Self {
        self.hue = hue;
        self
    }

    pub fn mobile(&self) -> Option<&MobileData> {
        match &self.kind {
            ObjKind::Mobile(m) => Some(m),
            _ => None,
        }
    }

    pub fn mobile_mut(&mut self) -> Option<&mut MobileData> {
        match &mut self.kind {
            ObjKind::Mobile(m) => Some(m),
            _ => None,
        }
    }
}

/// A line of text floating over an entity, stored on the owning side and
/// looked up by serial at draw time.
#[derive(Clone, Debug)]
pub struct OverheadLine {
    pub text: String,
    pub hue: u16,
    pub expires_at: u64,
}

/// Darkest ambient light level; 0 is full daylight.
pub const LIGHT_LEVEL_NIGHT: u8 = 30;

/// The client-side world model: an object arena plus tile-column and serial
/// indices over it.
///
/// The render pipeline borrows objects through handles for one frame and
/// never owns them; creation and destruction are driven by the network layer.
pub struct World {
    pub in_game: bool,
    /// Effective ambient light, 0 (daylight) ..= LIGHT_LEVEL_NIGHT.
    pub light_level: u8,
    pub tiledata: TileDataTable,
    slots: Vec<Option<GameObject>>,
    free: Vec<u32>,
    columns: HashMap<(i32, i32), Vec<ObjHandle>>,
    serials: HashMap<Serial, ObjHandle>,
    player: Option<ObjHandle>,
    overhead: HashMap<Serial, Vec<OverheadLine>>,
}

impl World {
    pub fn new() -> Self {
        Self {
            in_game: false,
            light_level: 0,
            tiledata: TileDataTable::new(),
            slots: Vec::new(),
            free: Vec::new(),
            columns: HashMap::new(),
            serials: HashMap::new(),
            player: None,
            overhead: HashMap::new(),
        }
    }

    pub fn insert(&mut self, object: GameObject) -> ObjHandle {
        let serial = object.serial;
        let pos = object.pos;
        let handle = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(object);
                ObjHandle(index)
            }
            None => {
                self.slots.push(Some(object));
                ObjHandle(self.slots.len() as u32 - 1)
            }
        };
        self.columns.entry((pos.x, pos.y)).or_default().push(handle);
        if let Some(serial) = serial {
            self.serials.insert(serial, handle);
        }
        handle
    }

    pub fn remove(&mut self, handle: ObjHandle) -> Option<GameObject> {
        let object = self.slots.get_mut(handle.index())?.take()?;
        self.unlink_column(handle, object.pos);
        if let Some(serial) = object.serial {
            self.serials.remove(&serial);
            self.overhead.remove(&serial);
        }
        if self.player == Some(handle) {
            self.player = None;
        }
        self.free.push(handle.0);
        Some(object)
    }

    pub fn get(&self, handle: ObjHandle) -> Option<&GameObject> {
        self.slots.get(handle.index())?.as_ref()
    }

    pub fn get_mut(&mut self, handle: ObjHandle) -> Option<&mut GameObject> {
        self.slots.get_mut(handle.index())?.as_mut()
    }

    pub fn by_serial(&self, serial: Serial) -> Option<ObjHandle> {
        self.serials.get(&serial).copied()
    }

    /// Moves an object to a new tile, keeping the column index consistent.
    pub fn relocate(&mut self, handle: ObjHandle, pos: TilePos) {
        let old = match self.get(handle) {
            Some(object) => object.pos,
            None => return,
        };
        if (old.x, old.y) != (pos.x, pos.y) {
            self.unlink_column(handle, old);
            self.columns.entry((pos.x, pos.y)).or_default().push(handle);
        }
        if let Some(object) = self.get_mut(handle) {
            object.pos = pos;
        }
    }

    fn unlink_column(&mut self, handle: ObjHandle, pos: TilePos) {
        if let Some(column) = self.columns.get_mut(&(pos.x, pos.y)) {
            column.retain(|&h| h != handle);
            if column.is_empty() {
                self.columns.remove(&(pos.x, pos.y));
            }
        }
    }

    /// All objects standing in the tile column at (x, y), in insertion order.
    pub fn column(&self, x: i32, y: i32) -> &[ObjHandle] {
        self.columns
            .get(&(x, y))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_player(&mut self, handle: ObjHandle) {
        self.player = Some(handle);
    }

    pub fn player(&self) -> Option<ObjHandle> {
        self.player
    }

    pub fn player_object(&self) -> Option<&GameObject> {
        self.get(self.player?)
    }

    pub fn player_pos(&self) -> Option<TilePos> {
        self.player_object().map(|p| p.pos)
    }

    /// Tile data for an object's graphic.
    pub fn data_of(&self, object: &GameObject) -> &TileData {
        self.tiledata.get(object.graphic)
    }

    /// Z of the land tile in a column, or 0 if none is loaded.
    pub fn ground_z(&self, x: i32, y: i32) -> i32 {
        self.column(x, y)
            .iter()
            .filter_map(|&h| self.get(h))
            .find(|o| matches!(o.kind, ObjKind::Land))
            .map(|o| o.pos.z)
            .unwrap_or(0)
    }

    /// Chebyshev tile distance from the player, or `i32::MAX` out of game.
    pub fn distance_from_player(&self, pos: TilePos) -> i32 {
        match self.player_pos() {
            Some(player) => player.distance(pos),
            None => i32::MAX,
        }
    }

    /// Iterates every live object handle. Order is arena order, not spatial.
    pub fn iter(&self) -> impl Iterator<Item = (ObjHandle, &GameObject)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|o| (ObjHandle(i as u32), o)))
    }

    pub fn mobiles(&self) -> impl Iterator<Item = (ObjHandle, &GameObject)> {
        self.iter().filter(|(_, o)| o.kind.is_mobile())
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_overhead(&mut self, serial: Serial, line: OverheadLine) {
        self.overhead.entry(serial).or_default().push(line);
    }

    pub fn overhead_lines(&self, serial: Serial) -> &[OverheadLine] {
        self.overhead
            .get(&serial)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Drops overhead lines whose lifetime has passed.
    pub fn expire_overhead(&mut self, now: u64) {
        self.overhead.retain(|_, lines| {
            lines.retain(|line| line.expires_at > now);
            !lines.is_empty()
        });
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn land(x: i32, y: i32, z: i32) -> GameObject {
        GameObject::new(0x0003, TilePos::new(x, y, z), ObjKind::Land)
    }

    #[test]
    fn insert_indexes_column_and_serial() {
        let mut world = World::new();
        let h = world.insert(
            GameObject::new(
                0x0E75,
                TilePos::new(10, 20, 0),
                ObjKind::Item {
                    amount: 1,
                    container: None,
                    is_corpse: false,
                },
            )
            .with_serial(Serial(0x4000_0001)),
        );
        assert_eq!(world.column(10, 20), &[h]);
        assert_eq!(world.by_serial(Serial(0x4000_0001)), Some(h));
        assert_eq!(world.len(), 1);
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let mut world = World::new();
        let a = world.insert(land(1, 1, 0));
        world.remove(a);
        assert!(world.get(a).is_none());
        assert!(world.column(1, 1).is_empty());
        let b = world.insert(land(2, 2, 0));
        // Slot is recycled; the handle points at the new object.
        assert_eq!(a.index(), b.index());
        assert_eq!(world.get(b).unwrap().pos.x, 2);
    }

    #[test]
    fn relocate_moves_between_columns() {
        let mut world = World::new();
        let h = world.insert(land(5, 5, 0));
        world.relocate(h, TilePos::new(6, 5, 10));
        assert!(world.column(5, 5).is_empty());
        assert_eq!(world.column(6, 5), &[h]);
        assert_eq!(world.get(h).unwrap().pos.z, 10);
    }

    #[test]
    fn ground_z_finds_the_land_tile() {
        let mut world = World::new();
        world.insert(land(3, 3, -5));
        world.insert(GameObject::new(
            0x0100,
            TilePos::new(3, 3, 2),
            ObjKind::Static,
        ));
        assert_eq!(world.ground_z(3, 3), -5);
        assert_eq!(world.ground_z(9, 9), 0);
    }

    #[test]
    fn overhead_lines_expire() {
        let mut world = World::new();
        let serial = Serial(7);
        world.add_overhead(
            serial,
            OverheadLine {
                text: "hail".into(),
                hue: 0,
                expires_at: 1000,
            },
        );
        world.expire_overhead(500);
        assert_eq!(world.overhead_lines(serial).len(), 1);
        world.expire_overhead(1000);
        assert!(world.overhead_lines(serial).is_empty());
    }
}
