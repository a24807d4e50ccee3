//! Macro bindings and dispatch.
//!
//! Any non-primary mouse button, keyboard key, wheel tick, or controller
//! button can be bound to a macro together with a live modifier-key state.
//! Movement macros set per-direction flags on press and clear them on
//! release, feeding the same continuous polling as ordinary keyboard
//! movement; look-at-mouse is a hold toggle rather than edge-triggered.

use winit::{event::MouseButton, keyboard::KeyCode};

use crate::math::Direction;

/// A bindable physical input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroInput {
    Key(KeyCode),
    /// Any mouse button except left/right, which belong to interaction.
    Mouse(MouseButton),
    WheelUp,
    WheelDown,
    Controller(gilrs::Button),
}

impl MacroInput {
    /// Left and right mouse buttons cannot carry macros.
    pub fn bindable(&self) -> bool {
        !matches!(
            self,
            MacroInput::Mouse(MouseButton::Left) | MacroInput::Mouse(MouseButton::Right)
        )
    }
}

/// Modifier-key state that must match exactly for a binding to fire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        alt: false,
        ctrl: false,
        shift: false,
    };

    pub fn ctrl() -> Self {
        Modifiers {
            ctrl: true,
            ..Self::NONE
        }
    }

    pub fn shift() -> Self {
        Modifiers {
            shift: true,
            ..Self::NONE
        }
    }
}

/// What a binding does when it fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MacroAction {
    /// Hold-to-move: sets the direction flag while the input is down.
    Walk(Direction),
    /// Hold toggle: face the cursor while the input is down.
    LookAtMouse,
    ToggleWarMode,
    /// Opaque macro id executed by the external macro engine.
    Execute(u16),
}

struct MacroBinding {
    input: MacroInput,
    mods: Modifiers,
    action: MacroAction,
}

/// Binding table plus dispatch state.
pub struct MacroEngine {
    bindings: Vec<MacroBinding>,
    pending: Option<MacroAction>,
    held_directions: [bool; 8],
    look_at_mouse: bool,
}

impl MacroEngine {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            pending: None,
            held_directions: [false; 8],
            look_at_mouse: false,
        }
    }

    /// Add a binding. Unbindable inputs are ignored.
    pub fn bind(&mut self, input: MacroInput, mods: Modifiers, action: MacroAction) {
        if !input.bindable() {
            return;
        }
        self.bindings.push(MacroBinding {
            input,
            mods,
            action,
        });
    }

    fn lookup(&self, input: MacroInput, mods: Modifiers) -> Option<&MacroAction> {
        self.bindings
            .iter()
            .find(|b| b.input == input && b.mods == mods)
            .map(|b| &b.action)
    }

    /// Feed a press. Returns true when a binding consumed it.
    ///
    /// Dispatch is gated off while chat input holds keyboard focus.
    pub fn on_input_down(&mut self, input: MacroInput, mods: Modifiers, chat_focused: bool) -> bool {
        if chat_focused {
            return false;
        }
        let action = match self.lookup(input, mods) {
            Some(action) => action.clone(),
            None => return false,
        };
        match action {
            MacroAction::Walk(direction) => {
                self.held_directions[direction.index()] = true;
            }
            MacroAction::LookAtMouse => {
                self.look_at_mouse = true;
            }
            other => {
                self.pending = Some(other);
            }
        }
        true
    }

    /// Feed a release. Clears hold-style actions bound to the input under
    /// any modifier state, so a dropped modifier can't wedge a flag on.
    pub fn on_input_up(&mut self, input: MacroInput) {
        for binding in self.bindings.iter().filter(|b| b.input == input) {
            match binding.action {
                MacroAction::Walk(direction) => {
                    self.held_directions[direction.index()] = false;
                }
                MacroAction::LookAtMouse => {
                    self.look_at_mouse = false;
                }
                _ => {}
            }
        }
    }

    /// The macro queued for execution this tick, if any.
    pub fn take_pending(&mut self) -> Option<MacroAction> {
        self.pending.take()
    }

    /// First direction held via a movement macro.
    pub fn held_direction(&self) -> Option<Direction> {
        self.held_directions
            .iter()
            .position(|&held| held)
            .map(Direction::from_index)
    }

    pub fn look_at_mouse(&self) -> bool {
        self.look_at_mouse
    }
}

impl Default for MacroEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_state_must_match_exactly() {
        let mut engine = MacroEngine::new();
        engine.bind(
            MacroInput::Key(KeyCode::KeyX),
            Modifiers::NONE,
            MacroAction::Execute(1),
        );
        engine.bind(
            MacroInput::Key(KeyCode::KeyX),
            Modifiers::ctrl(),
            MacroAction::Execute(2),
        );

        assert!(engine.on_input_down(MacroInput::Key(KeyCode::KeyX), Modifiers::ctrl(), false));
        assert_eq!(engine.take_pending(), Some(MacroAction::Execute(2)));

        assert!(engine.on_input_down(MacroInput::Key(KeyCode::KeyX), Modifiers::NONE, false));
        assert_eq!(engine.take_pending(), Some(MacroAction::Execute(1)));

        assert!(!engine.on_input_down(MacroInput::Key(KeyCode::KeyX), Modifiers::shift(), false));
    }

    #[test]
    fn chat_focus_gates_dispatch() {
        let mut engine = MacroEngine::new();
        engine.bind(
            MacroInput::Key(KeyCode::KeyS),
            Modifiers::NONE,
            MacroAction::Execute(9),
        );
        assert!(!engine.on_input_down(MacroInput::Key(KeyCode::KeyS), Modifiers::NONE, true));
        assert_eq!(engine.take_pending(), None);
    }

    #[test]
    fn movement_macro_sets_and_clears_direction_flags() {
        let mut engine = MacroEngine::new();
        engine.bind(
            MacroInput::Key(KeyCode::Numpad8),
            Modifiers::NONE,
            MacroAction::Walk(Direction::North),
        );
        engine.on_input_down(MacroInput::Key(KeyCode::Numpad8), Modifiers::NONE, false);
        assert_eq!(engine.held_direction(), Some(Direction::North));
        engine.on_input_up(MacroInput::Key(KeyCode::Numpad8));
        assert_eq!(engine.held_direction(), None);
    }

    #[test]
    fn look_at_mouse_is_a_hold_toggle() {
        let mut engine = MacroEngine::new();
        engine.bind(
            MacroInput::Mouse(MouseButton::Middle),
            Modifiers::NONE,
            MacroAction::LookAtMouse,
        );
        engine.on_input_down(MacroInput::Mouse(MouseButton::Middle), Modifiers::NONE, false);
        assert!(engine.look_at_mouse());
        assert_eq!(engine.take_pending(), None);
        engine.on_input_up(MacroInput::Mouse(MouseButton::Middle));
        assert!(!engine.look_at_mouse());
    }

    #[test]
    fn primary_buttons_cannot_be_bound() {
        let mut engine = MacroEngine::new();
        engine.bind(
            MacroInput::Mouse(MouseButton::Left),
            Modifiers::NONE,
            MacroAction::Execute(3),
        );
        assert!(!engine.on_input_down(
            MacroInput::Mouse(MouseButton::Left),
            Modifiers::NONE,
            false
        ));
    }
}
