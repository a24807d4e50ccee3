//! Pathfinder interface.
//!
//! Path computation lives outside this crate; the scene only issues walk
//! requests and queries whether an automatic walk is running. Manual movement
//! input cancels an active walk through `stop`.

/// Request/query surface of the external pathfinder.
pub trait Pathfinder {
    /// Start walking toward (x, y, z), stopping within `distance` tiles.
    /// Returns false if no path exists.
    fn walk_to(&mut self, x: i32, y: i32, z: i32, distance: i32) -> bool;

    /// Whether an automatic path-walk is currently in progress.
    fn auto_walking(&self) -> bool;

    /// Cancel the active path-walk, if any.
    fn stop(&mut self);
}

/// Pathfinder that never finds a path. Useful as a default and in tests.
#[derive(Default)]
pub struct NoPathfinder;

impl Pathfinder for NoPathfinder {
    fn walk_to(&mut self, _x: i32, _y: i32, _z: i32, _distance: i32) -> bool {
        false
    }

    fn auto_walking(&self) -> bool {
        false
    }

    fn stop(&mut self) {}
}
