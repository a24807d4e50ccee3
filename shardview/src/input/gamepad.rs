//! Controller input tracking via gilrs.
//!
//! The tracker polls events once per tick, keeping the left-stick vector for
//! the movement octant mapping and edge-triggered button presses for macro
//! dispatch.

use gilrs::{Axis, Button, EventType, Gilrs};

/// Polled controller state for one tick.
pub struct GamepadState {
    gilrs: Option<Gilrs>,
    pub connected: bool,
    stick_x: f32,
    stick_y: f32,
    held: Vec<Button>,
    pressed: Vec<Button>,
}

impl GamepadState {
    pub fn new() -> Self {
        let (gilrs, connected) = match Gilrs::new() {
            Ok(g) => {
                let has_pad = g.gamepads().next().is_some();
                (Some(g), has_pad)
            }
            Err(e) => {
                log::warn!("gamepad support unavailable: {}", e);
                (None, false)
            }
        };
        Self {
            gilrs,
            connected,
            stick_x: 0.0,
            stick_y: 0.0,
            held: Vec::new(),
            pressed: Vec::new(),
        }
    }

    /// Drain pending controller events. Call once per Update tick.
    pub fn poll(&mut self) {
        self.pressed.clear();
        let gilrs = match &mut self.gilrs {
            Some(g) => g,
            None => return,
        };

        while let Some(event) = gilrs.next_event() {
            match event.event {
                EventType::ButtonPressed(button, _) => {
                    self.connected = true;
                    if !self.held.contains(&button) {
                        self.held.push(button);
                        self.pressed.push(button);
                    }
                }
                EventType::ButtonReleased(button, _) => {
                    self.held.retain(|&b| b != button);
                }
                EventType::AxisChanged(axis, value, _) => {
                    self.connected = true;
                    match axis {
                        Axis::LeftStickX => self.stick_x = value,
                        Axis::LeftStickY => self.stick_y = value,
                        _ => {}
                    }
                }
                EventType::Connected => {
                    self.connected = true;
                }
                EventType::Disconnected => {
                    self.connected = false;
                    self.held.clear();
                    self.pressed.clear();
                    self.stick_x = 0.0;
                    self.stick_y = 0.0;
                }
                _ => {}
            }
        }
    }

    /// Left-stick vector, X right-positive, Y up-positive.
    pub fn stick(&self) -> (f32, f32) {
        (self.stick_x, self.stick_y)
    }

    /// Buttons that went down since the last poll.
    pub fn pressed_buttons(&self) -> &[Button] {
        &self.pressed
    }

    pub fn is_held(&self, button: Button) -> bool {
        self.held.contains(&button)
    }
}

impl Default for GamepadState {
    fn default() -> Self {
        Self::new()
    }
}
