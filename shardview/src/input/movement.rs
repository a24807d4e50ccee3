//! Continuous movement polling and follow mode.
//!
//! Keyboard, mouse-hold, and gamepad each produce at most one direction
//! request per tick; they are polled in that order and only one source wins.
//! No source engages while an automatic path-walk runs, except that manual
//! input cancels the walk and takes over.

use winit::{event::MouseButton, keyboard::KeyCode};

use crate::input::macros::MacroEngine;
use crate::input::InputState;
use crate::math::{Direction, Rect, Vec2};
use crate::pathfind::Pathfinder;
use crate::profile::ProfileSnapshot;
use crate::world::{Serial, World};

/// Cursor closer to the move center than this produces no movement.
pub const MOUSE_MOVE_MIN_DISTANCE: f32 = 60.0;

/// Cursor farther than this runs instead of walks.
pub const MOUSE_RUN_DISTANCE: f32 = 190.0;

/// Stick deflection below this is dead.
const STICK_WALK_THRESHOLD: f32 = 0.25;

/// Stick deflection at or above this runs.
const STICK_RUN_THRESHOLD: f32 = 0.75;

/// Mobiles farther than this are out of view and cannot be followed.
pub const FOLLOW_VIEW_RANGE: i32 = 24;

/// One movement request for this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveRequest {
    pub direction: Direction,
    pub run: bool,
}

/// Keyboard direction from the currently held key set, recomputed every tick
/// from raw state rather than event edges. Arrow keys and WASD both count;
/// perpendicular holds combine into diagonals.
pub fn keyboard_direction(input: &InputState, macros: &MacroEngine) -> Option<Direction> {
    let up = input.is_key_down(KeyCode::ArrowUp) || input.is_key_down(KeyCode::KeyW);
    let down = input.is_key_down(KeyCode::ArrowDown) || input.is_key_down(KeyCode::KeyS);
    let left = input.is_key_down(KeyCode::ArrowLeft) || input.is_key_down(KeyCode::KeyA);
    let right = input.is_key_down(KeyCode::ArrowRight) || input.is_key_down(KeyCode::KeyD);

    let vertical = (up, down);
    let horizontal = (left, right);
    let direction = match (vertical, horizontal) {
        ((true, false), (false, false)) => Some(Direction::North),
        ((true, false), (false, true)) => Some(Direction::NorthEast),
        ((false, false), (false, true)) => Some(Direction::East),
        ((false, true), (false, true)) => Some(Direction::SouthEast),
        ((false, true), (false, false)) => Some(Direction::South),
        ((false, true), (true, false)) => Some(Direction::SouthWest),
        ((false, false), (true, false)) => Some(Direction::West),
        ((true, false), (true, false)) => Some(Direction::NorthWest),
        _ => None,
    };
    // Movement macros feed the same per-tick poll as held keys.
    direction.or_else(|| macros.held_direction())
}

/// Mouse-hold movement: direction from the angle between the (profile
/// offset) viewport center and the cursor; distance picks walk vs. run.
pub fn mouse_direction(
    input: &InputState,
    bounds: Rect,
    profile: &ProfileSnapshot,
) -> Option<MoveRequest> {
    if !input.is_mouse_down(MouseButton::Right) {
        return None;
    }
    let center = bounds.center()
        + Vec2::new(profile.move_center_offset_x, profile.move_center_offset_y);
    let v = input.mouse_position() - center;
    let distance = v.length();
    if distance < MOUSE_MOVE_MIN_DISTANCE {
        return None;
    }
    Some(MoveRequest {
        direction: Direction::from_screen_vector(v),
        run: distance > MOUSE_RUN_DISTANCE,
    })
}

/// Gamepad movement: three-level deadzone over the left stick, mapped to the
/// eight octants.
pub fn gamepad_direction(stick: (f32, f32)) -> Option<MoveRequest> {
    let magnitude = (stick.0 * stick.0 + stick.1 * stick.1).sqrt();
    if magnitude < STICK_WALK_THRESHOLD {
        return None;
    }
    // Stick Y is up-positive; screen Y is down-positive.
    let screen = Vec2::new(stick.0, -stick.1);
    Some(MoveRequest {
        direction: Direction::from_screen_vector(screen),
        run: magnitude >= STICK_RUN_THRESHOLD,
    })
}

/// Polls all movement sources and resolves the tick's single winner.
///
/// A manual request cancels an in-progress automatic path-walk; with no
/// manual input an active path-walk keeps the tick silent.
pub fn poll_movement(
    input: &InputState,
    macros: &MacroEngine,
    stick: (f32, f32),
    bounds: Rect,
    profile: &ProfileSnapshot,
    pathfinder: &mut dyn Pathfinder,
) -> Option<MoveRequest> {
    let request = keyboard_direction(input, macros)
        .map(|direction| MoveRequest {
            direction,
            run: profile.always_run,
        })
        .or_else(|| mouse_direction(input, bounds, profile))
        .or_else(|| gamepad_direction(stick));

    match request {
        Some(request) => {
            if pathfinder.auto_walking() {
                pathfinder.stop();
            }
            Some(request)
        }
        None => None,
    }
}

/// Follow mode: a persisted flag plus target serial.
#[derive(Clone, Copy, Debug, Default)]
pub struct FollowState {
    pub active: bool,
    pub target: Option<Serial>,
}

impl FollowState {
    pub fn start(&mut self, target: Serial) {
        self.active = true;
        self.target = Some(target);
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.target = None;
    }
}

/// Per-tick follow update.
///
/// Cancels when the target leaves view range or disappears; issues a
/// path-walk when the target drifts past the configured distance; a failed
/// walk cancels follow unless the player is paralyzed (the failure is then
/// transient).
pub fn tick_follow(
    follow: &mut FollowState,
    world: &World,
    profile: &ProfileSnapshot,
    pathfinder: &mut dyn Pathfinder,
) {
    if !follow.active {
        return;
    }
    let target = match follow.target.and_then(|serial| world.by_serial(serial)) {
        Some(handle) => handle,
        None => {
            follow.cancel();
            return;
        }
    };
    let target_pos = match world.get(target) {
        Some(obj) => obj.pos,
        None => {
            follow.cancel();
            return;
        }
    };

    let distance = world.distance_from_player(target_pos);
    if distance > FOLLOW_VIEW_RANGE {
        log::debug!("follow target out of range, canceling");
        follow.cancel();
        return;
    }
    if distance > profile.auto_follow_distance {
        let ok = pathfinder.walk_to(
            target_pos.x,
            target_pos.y,
            target_pos.z,
            profile.auto_follow_distance,
        );
        if !ok {
            let paralyzed = world
                .player_object()
                .and_then(|p| p.mobile())
                .map(|m| m.paralyzed)
                .unwrap_or(false);
            if !paralyzed {
                follow.cancel();
            }
        }
    }
}
