pub mod drag;
pub mod gamepad;
pub mod macros;
pub mod movement;
pub mod targeting;

use std::collections::HashSet;

use crossbeam_channel::{unbounded, Receiver, Sender};
use winit::{event::MouseButton, keyboard::KeyCode};

use crate::math::Vec2;
use crate::render::{art_bounds, ArtDimensions, RenderCategory, RenderLists};
use crate::world::ObjHandle;

/// Interval within which two left releases make a double click.
pub const DOUBLE_CLICK_MS: u64 = 350;

/// A device event as delivered by the OS layer.
///
/// Events are queued on a channel and drained synchronously at the top of the
/// Update tick, so callback timing never splits a frame.
#[derive(Clone, Copy, Debug)]
pub enum InputEvent {
    KeyDown { key: KeyCode },
    KeyUp { key: KeyCode },
    MouseMove { x: f32, y: f32 },
    MouseDown { button: MouseButton },
    MouseUp { button: MouseButton },
    Wheel { delta: f32 },
}

/// Channel carrying device events from OS callbacks into the frame loop.
pub struct InputQueue {
    sender: Sender<InputEvent>,
    receiver: Receiver<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Handle for the windowing layer to push events from.
    pub fn sender(&self) -> Sender<InputEvent> {
        self.sender.clone()
    }

    /// Drains every queued event into the input state.
    pub fn drain_into(&self, state: &mut InputState) {
        while let Ok(event) = self.receiver.try_recv() {
            state.apply(event);
        }
    }
}

impl Default for InputQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks keyboard and mouse state across frames.
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,

    mouse: Vec2,
    wheel: f32,
    mouse_down: [bool; 8],
    mouse_pressed: [bool; 8],
    mouse_released: [bool; 8],
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_down: HashSet::new(),
            keys_pressed: HashSet::new(),
            keys_released: HashSet::new(),
            mouse: Vec2::ZERO,
            wheel: 0.0,
            mouse_down: [false; 8],
            mouse_pressed: [false; 8],
            mouse_released: [false; 8],
        }
    }

    /// Clear per-frame pressed/released flags.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.mouse_pressed.fill(false);
        self.mouse_released.fill(false);
        self.wheel = 0.0;
    }

    pub fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyDown { key } => {
                if !self.keys_down.contains(&key) {
                    self.keys_pressed.insert(key);
                }
                self.keys_down.insert(key);
            }
            InputEvent::KeyUp { key } => {
                self.keys_down.remove(&key);
                self.keys_released.insert(key);
            }
            InputEvent::MouseMove { x, y } => {
                self.mouse = Vec2::new(x, y);
            }
            InputEvent::MouseDown { button } => {
                if let Some(idx) = mouse_button_index(button) {
                    if !self.mouse_down[idx] {
                        self.mouse_pressed[idx] = true;
                    }
                    self.mouse_down[idx] = true;
                }
            }
            InputEvent::MouseUp { button } => {
                if let Some(idx) = mouse_button_index(button) {
                    self.mouse_down[idx] = false;
                    self.mouse_released[idx] = true;
                }
            }
            InputEvent::Wheel { delta } => {
                self.wheel += delta;
            }
        }
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    pub fn is_mouse_down(&self, button: MouseButton) -> bool {
        mouse_button_index(button)
            .map(|idx| self.mouse_down[idx])
            .unwrap_or(false)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        mouse_button_index(button)
            .map(|idx| self.mouse_pressed[idx])
            .unwrap_or(false)
    }

    pub fn is_mouse_released(&self, button: MouseButton) -> bool {
        mouse_button_index(button)
            .map(|idx| self.mouse_released[idx])
            .unwrap_or(false)
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse
    }

    pub fn wheel_delta(&self) -> f32 {
        self.wheel
    }

    pub fn alt(&self) -> bool {
        self.is_key_down(KeyCode::AltLeft) || self.is_key_down(KeyCode::AltRight)
    }

    pub fn ctrl(&self) -> bool {
        self.is_key_down(KeyCode::ControlLeft) || self.is_key_down(KeyCode::ControlRight)
    }

    pub fn shift(&self) -> bool {
        self.is_key_down(KeyCode::ShiftLeft) || self.is_key_down(KeyCode::ShiftRight)
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

fn mouse_button_index(button: MouseButton) -> Option<usize> {
    match button {
        MouseButton::Left => Some(0),
        MouseButton::Right => Some(1),
        MouseButton::Middle => Some(2),
        MouseButton::Back => Some(3),
        MouseButton::Forward => Some(4),
        MouseButton::Other(raw) => {
            let mapped = 5 + raw as usize;
            (mapped < 8).then_some(mapped)
        }
    }
}

/// Outcome of a left release as seen by the click tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickKind {
    /// Second release inside the double-click window.
    Double,
    /// First release; a single click is armed and will fire after the window
    /// closes without a second release.
    ArmedSingle,
}

/// Left-button click timing: double-click detection plus the delayed
/// single-click that a double click cancels.
#[derive(Default)]
pub struct ClickTracker {
    armed: Option<(u64, Option<ObjHandle>)>,
}

impl ClickTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a left release over `target` at time `now`.
    pub fn on_left_release(&mut self, now: u64, target: Option<ObjHandle>) -> ClickKind {
        match self.armed.take() {
            Some((armed_at, armed_target))
                if now.saturating_sub(armed_at) < DOUBLE_CLICK_MS && armed_target == target =>
            {
                ClickKind::Double
            }
            _ => {
                self.armed = Some((now, target));
                ClickKind::ArmedSingle
            }
        }
    }

    /// Returns the armed single-click target once its window has expired.
    pub fn take_expired_single(&mut self, now: u64) -> Option<Option<ObjHandle>> {
        match self.armed {
            Some((armed_at, target)) if now.saturating_sub(armed_at) >= DOUBLE_CLICK_MS => {
                self.armed = None;
                Some(target)
            }
            _ => None,
        }
    }

    /// Drops any armed single click (a double click consumed it).
    pub fn cancel_pending(&mut self) {
        self.armed = None;
    }
}

/// Resolves the topmost object under the cursor from the frame's render
/// lists, using art dimensions for per-object hit boxes.
pub fn pick_object(
    lists: &RenderLists,
    art: &dyn ArtDimensions,
    cursor: Vec2,
) -> Option<ObjHandle> {
    let mut best: Option<(i32, ObjHandle)> = None;
    for category in RenderCategory::ALL {
        for entry in lists.entries(category) {
            if entry.alpha == 0 {
                continue;
            }
            let bounds = art_bounds(entry.screen, art.size_of(entry.graphic));
            if !bounds.contains(cursor) {
                continue;
            }
            if best.map(|(depth, _)| entry.depth > depth).unwrap_or(true) {
                best = Some((entry.depth, entry.handle));
            }
        }
    }
    best.map(|(_, handle)| handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_click_requires_the_window_and_the_same_target() {
        let mut tracker = ClickTracker::new();
        assert_eq!(tracker.on_left_release(0, None), ClickKind::ArmedSingle);
        assert_eq!(tracker.on_left_release(100, None), ClickKind::Double);

        assert_eq!(tracker.on_left_release(1000, None), ClickKind::ArmedSingle);
        assert_eq!(
            tracker.on_left_release(1000 + DOUBLE_CLICK_MS, None),
            ClickKind::ArmedSingle,
            "a release outside the window re-arms instead of doubling"
        );
    }

    #[test]
    fn armed_single_fires_once_after_the_window() {
        let mut tracker = ClickTracker::new();
        tracker.on_left_release(0, None);
        assert!(tracker.take_expired_single(100).is_none());
        assert_eq!(tracker.take_expired_single(DOUBLE_CLICK_MS), Some(None));
        assert!(tracker.take_expired_single(DOUBLE_CLICK_MS + 1).is_none());
    }

    #[test]
    fn double_click_cancels_the_pending_single() {
        let mut tracker = ClickTracker::new();
        tracker.on_left_release(0, None);
        assert_eq!(tracker.on_left_release(50, None), ClickKind::Double);
        assert!(tracker.take_expired_single(DOUBLE_CLICK_MS * 2).is_none());
    }

    #[test]
    fn queue_delivers_events_in_order() {
        let queue = InputQueue::new();
        let sender = queue.sender();
        sender
            .send(InputEvent::KeyDown {
                key: KeyCode::KeyW,
            })
            .unwrap();
        sender.send(InputEvent::MouseMove { x: 5.0, y: 6.0 }).unwrap();

        let mut state = InputState::new();
        queue.drain_into(&mut state);
        assert!(state.is_key_down(KeyCode::KeyW));
        assert!(state.is_key_pressed(KeyCode::KeyW));
        assert_eq!(state.mouse_position(), Vec2::new(5.0, 6.0));
    }

    #[test]
    fn modifier_queries_track_both_sides() {
        let mut state = InputState::new();
        state.apply(InputEvent::KeyDown {
            key: KeyCode::ControlRight,
        });
        assert!(state.ctrl());
        assert!(!state.shift());
    }
}
