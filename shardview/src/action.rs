//! Outbound world actions.
//!
//! Every interaction the input machine resolves becomes a value in the tick's
//! action queue. The surrounding session layer drains the queue onto the
//! wire; tests assert on it directly.

use crate::math::Direction;
use crate::world::Serial;

/// One action bound for the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientAction {
    PickUp {
        serial: Serial,
        amount: u16,
    },
    /// Drop the held item into a container or onto a mobile; position fields
    /// are meaningless for this form.
    DropInto {
        serial: Serial,
        container: Serial,
    },
    /// Drop the held item at a world position.
    DropAt {
        serial: Serial,
        x: i32,
        y: i32,
        z: i32,
    },
    /// Ctrl-drop: equip the held item on the player.
    EquipSelf {
        serial: Serial,
    },
    SingleClick {
        serial: Serial,
    },
    DoubleClick {
        serial: Serial,
    },
    OpenCorpse {
        serial: Serial,
    },
    Attack {
        serial: Serial,
    },
    TargetObject {
        serial: Serial,
        graphic: u16,
        x: i32,
        y: i32,
        z: i32,
    },
    TargetPosition {
        x: i32,
        y: i32,
        z: i32,
        graphic: u16,
    },
    CancelTarget,
    ToggleWarMode,
    Walk {
        direction: Direction,
        run: bool,
    },
    /// Request a world resync after a stale connection.
    Resync,
}

/// Per-tick queue of outbound actions.
#[derive(Default)]
pub struct ActionQueue {
    actions: Vec<ClientAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: ClientAction) {
        self.actions.push(action);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = ClientAction> + '_ {
        self.actions.drain(..)
    }

    pub fn as_slice(&self) -> &[ClientAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }
}
