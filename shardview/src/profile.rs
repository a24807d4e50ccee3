//! Player profile: the named toggles the pipeline reads every tick, plus the
//! opaque session fields the surrounding lifecycle persists alongside them.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Modifier keys that must be held for a drag-select gesture to begin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragSelectModifier {
    #[default]
    None,
    Ctrl,
    Shift,
    CtrlShift,
}

/// Corner of the viewport where drag-select health bars start stacking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarCorner {
    #[default]
    TopLeft,
    TopRight,
}

/// Errors from loading or storing a profile.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed profile: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The persisted profile.
///
/// Everything the frame loop consults lives here; per-tick code never reads
/// this directly but goes through a [`ProfileSnapshot`] captured at the top
/// of the tick.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    // Lighting
    pub lights_enabled: bool,
    pub colored_lights: bool,
    pub alternate_lights: bool,
    pub dark_nights: bool,

    // Drag select
    pub drag_select_enabled: bool,
    pub drag_select_modifier: DragSelectModifier,
    pub drag_select_players: bool,
    pub drag_select_monsters: bool,
    pub drag_select_named_only: bool,
    pub drag_select_anchor: bool,
    pub drag_select_corner: BarCorner,

    // Interaction
    pub drop_distance: i32,
    pub pathfind_on_single_click: bool,

    // Movement
    pub always_run: bool,
    pub auto_follow_distance: i32,
    /// Screen-space offset added to the viewport center when deriving the
    /// mouse-hold movement direction.
    pub move_center_offset_x: f32,
    pub move_center_offset_y: f32,

    // Presentation
    pub scale: f32,
    pub enable_death_screen: bool,
    pub black_white_death_effect: bool,

    // Session
    pub auto_reconnect: bool,

    /// Opaque fields owned by the session lifecycle (window geometry and the
    /// like). Persisted verbatim, never interpreted by the pipeline.
    pub session: serde_json::Map<String, serde_json::Value>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            lights_enabled: true,
            colored_lights: true,
            alternate_lights: false,
            dark_nights: false,
            drag_select_enabled: true,
            drag_select_modifier: DragSelectModifier::Ctrl,
            drag_select_players: true,
            drag_select_monsters: true,
            drag_select_named_only: false,
            drag_select_anchor: false,
            drag_select_corner: BarCorner::TopLeft,
            drop_distance: 3,
            pathfind_on_single_click: false,
            always_run: false,
            auto_follow_distance: 2,
            move_center_offset_x: 0.0,
            move_center_offset_y: 0.0,
            scale: 1.0,
            enable_death_screen: true,
            black_white_death_effect: true,
            auto_reconnect: false,
            session: serde_json::Map::new(),
        }
    }
}

impl Profile {
    /// Serialize this profile to JSON.
    pub fn to_json(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a profile from JSON.
    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ProfileError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ProfileError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Captures the immutable per-tick view of this profile.
    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            lights_enabled: self.lights_enabled,
            colored_lights: self.colored_lights,
            alternate_lights: self.alternate_lights,
            dark_nights: self.dark_nights,
            drag_select_enabled: self.drag_select_enabled,
            drag_select_modifier: self.drag_select_modifier,
            drag_select_players: self.drag_select_players,
            drag_select_monsters: self.drag_select_monsters,
            drag_select_named_only: self.drag_select_named_only,
            drag_select_anchor: self.drag_select_anchor,
            drag_select_corner: self.drag_select_corner,
            drop_distance: self.drop_distance,
            pathfind_on_single_click: self.pathfind_on_single_click,
            always_run: self.always_run,
            auto_follow_distance: self.auto_follow_distance,
            move_center_offset_x: self.move_center_offset_x,
            move_center_offset_y: self.move_center_offset_y,
            scale: self.scale,
            enable_death_screen: self.enable_death_screen,
            black_white_death_effect: self.black_white_death_effect,
            auto_reconnect: self.auto_reconnect,
        }
    }
}

/// Immutable view of the profile for one Update/Draw tick.
///
/// Threaded through the pipeline entry points so a mid-tick profile edit can
/// never split a frame's behavior.
#[derive(Clone, Copy, Debug)]
pub struct ProfileSnapshot {
    pub lights_enabled: bool,
    pub colored_lights: bool,
    pub alternate_lights: bool,
    pub dark_nights: bool,
    pub drag_select_enabled: bool,
    pub drag_select_modifier: DragSelectModifier,
    pub drag_select_players: bool,
    pub drag_select_monsters: bool,
    pub drag_select_named_only: bool,
    pub drag_select_anchor: bool,
    pub drag_select_corner: BarCorner,
    pub drop_distance: i32,
    pub pathfind_on_single_click: bool,
    pub always_run: bool,
    pub auto_follow_distance: i32,
    pub move_center_offset_x: f32,
    pub move_center_offset_y: f32,
    pub scale: f32,
    pub enable_death_screen: bool,
    pub black_white_death_effect: bool,
    pub auto_reconnect: bool,
}

impl Default for ProfileSnapshot {
    fn default() -> Self {
        Profile::default().snapshot()
    }
}
