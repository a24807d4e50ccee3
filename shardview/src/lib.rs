//! Shardview - the scene rendering and interaction core of a networked
//! isometric world client.
//!
//! One Update and one Draw per driver tick: Update drains device input and
//! runs the targeting/movement machines, Draw culls the viewport, builds the
//! frame's render lists and light buffer, and composites through wgpu.

pub mod action;
pub mod audio;
pub mod input;
pub mod math;
pub mod pathfind;
pub mod profile;
pub mod render;
pub mod scene;
pub mod session;
pub mod viewport;
pub mod world;

pub use crate::action::{ActionQueue, ClientAction};
pub use crate::audio::{AudioSystem, SoundCue, SoundPlayer};
pub use crate::math::{Direction, Rect, TilePos, Vec2};
pub use crate::pathfind::Pathfinder;
pub use crate::profile::{Profile, ProfileSnapshot};
pub use crate::render::{Frame, FramePlan, Renderer};
pub use crate::scene::{FrameStats, GameScene};
pub use crate::session::{DisconnectBehavior, Session};
pub use crate::viewport::{Camera, TileWindow};
pub use crate::world::{GameObject, ObjHandle, ObjKind, Serial, World};
pub use winit::{event::MouseButton, keyboard::KeyCode};
