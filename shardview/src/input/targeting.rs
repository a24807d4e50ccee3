//! Modal targeting.
//!
//! While a target request is active, the next resolved world object or
//! position is routed to the requesting handler instead of triggering the
//! default interaction. Exactly one sub-state is active at a time; Escape
//! cancels a pending request; multi-placement keeps a preview ghost snapped
//! to the ground until the mode is vacated.

use crate::action::{ActionQueue, ClientAction};
use crate::math::TilePos;
use crate::world::{ObjHandle, Serial, World};

/// The modal targeting sub-states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    /// Ordinary server target expecting an object.
    Object,
    /// Ordinary server target expecting a position.
    Position,
    /// Client-side target consumed internally, no acknowledgement.
    Internal,
    /// Grab: pick the targeted item up.
    Grab,
    /// Record the targeted container as the grab bag.
    SetGrabBag,
    /// Client-side inspector.
    Inspect,
    /// Record the targeted object's hue.
    HuePick,
    /// Add the targeted mobile to the ignore list.
    IgnorePick,
    /// Prompt to move the targeted container.
    MoveContainer,
    /// House/boat placement with a preview ghost.
    MultiPlacement,
}

/// Placement data for a multi target, supplied with the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiTargetInfo {
    pub model: u16,
    pub hue: u16,
    pub x_offset: i32,
    pub y_offset: i32,
    pub z_offset: i32,
}

/// The preview structure shown during multi placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultiGhost {
    pub model: u16,
    pub hue: u16,
    pub pos: TilePos,
}

/// What a resolved target did, for the UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetEvent {
    Acknowledged,
    Internal(Serial),
    Grabbed(Serial),
    GrabBagSet(Serial),
    OpenInspector(Serial),
    HuePicked { serial: Serial, graphic: u16, hue: u16 },
    IgnoreAdded(Serial),
    MoveContainerPrompt(Serial),
    MultiPlaced(TilePos),
}

/// The active target request, if any.
pub struct Targeting {
    active: Option<TargetKind>,
    multi: Option<MultiTargetInfo>,
    ghost: Option<MultiGhost>,
}

impl Targeting {
    pub fn new() -> Self {
        Self {
            active: None,
            multi: None,
            ghost: None,
        }
    }

    /// Enter a targeting sub-state. A multi-placement request carries its
    /// placement info.
    pub fn request(&mut self, kind: TargetKind, multi: Option<MultiTargetInfo>) {
        log::debug!("target request: {:?}", kind);
        self.active = Some(kind);
        self.multi = multi;
        self.ghost = None;
    }

    pub fn is_targeting(&self) -> bool {
        self.active.is_some()
    }

    pub fn kind(&self) -> Option<TargetKind> {
        self.active
    }

    pub fn ghost(&self) -> Option<&MultiGhost> {
        self.ghost.as_ref()
    }

    /// Clear to idle without notifying the server (used after a resolved
    /// target and by attach/drop flows that reset targeting).
    pub fn clear(&mut self) {
        self.active = None;
        self.multi = None;
        self.ghost = None;
    }

    /// Escape: cancel a pending request, telling the server, and tear down
    /// the placement ghost.
    pub fn cancel(&mut self, actions: &mut ActionQueue) {
        if self.active.is_some() {
            actions.push(ClientAction::CancelTarget);
            self.clear();
        }
    }

    /// Per-tick ghost update while multi placement is active: snap the
    /// preview to the hovered tile at ground height plus the request offsets.
    pub fn update_ghost(&mut self, world: &World, hover_tile: (i32, i32)) {
        if self.active != Some(TargetKind::MultiPlacement) {
            self.ghost = None;
            return;
        }
        let info = match self.multi {
            Some(info) => info,
            None => return,
        };
        let x = hover_tile.0 + info.x_offset;
        let y = hover_tile.1 + info.y_offset;
        let z = world.ground_z(x, y) + info.z_offset;
        self.ghost = Some(MultiGhost {
            model: info.model,
            hue: info.hue,
            pos: TilePos::new(x, y, z),
        });
    }

    /// Resolve a left release while targeting.
    ///
    /// The object under the cursor becomes a serial+graphic+position target
    /// dispatched to the active sub-state's handler, then the mode clears to
    /// idle. A release over nothing keeps the request pending.
    pub fn resolve(
        &mut self,
        world: &World,
        target: Option<ObjHandle>,
        actions: &mut ActionQueue,
    ) -> Option<TargetEvent> {
        let kind = self.active?;

        if kind == TargetKind::MultiPlacement {
            let ghost = self.ghost?;
            actions.push(ClientAction::TargetPosition {
                x: ghost.pos.x,
                y: ghost.pos.y,
                z: ghost.pos.z,
                graphic: ghost.model,
            });
            self.clear();
            return Some(TargetEvent::MultiPlaced(ghost.pos));
        }

        let obj = world.get(target?)?;
        let serial = obj.serial.unwrap_or(Serial(0));
        let graphic = obj.graphic;
        let pos = obj.pos;

        let event = match kind {
            TargetKind::Object => {
                actions.push(ClientAction::TargetObject {
                    serial,
                    graphic,
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                });
                TargetEvent::Acknowledged
            }
            TargetKind::Position => {
                actions.push(ClientAction::TargetPosition {
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                    graphic,
                });
                TargetEvent::Acknowledged
            }
            TargetKind::Internal => TargetEvent::Internal(serial),
            TargetKind::Grab => {
                actions.push(ClientAction::PickUp { serial, amount: 1 });
                TargetEvent::Grabbed(serial)
            }
            TargetKind::SetGrabBag => TargetEvent::GrabBagSet(serial),
            TargetKind::Inspect => TargetEvent::OpenInspector(serial),
            TargetKind::HuePick => TargetEvent::HuePicked {
                serial,
                graphic,
                hue: obj.hue,
            },
            TargetKind::IgnorePick => TargetEvent::IgnoreAdded(serial),
            TargetKind::MoveContainer => TargetEvent::MoveContainerPrompt(serial),
            TargetKind::MultiPlacement => unreachable!("handled above"),
        };
        self.clear();
        Some(event)
    }
}

impl Default for Targeting {
    fn default() -> Self {
        Self::new()
    }
}
