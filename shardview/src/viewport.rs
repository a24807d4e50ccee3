//! Viewport culling: turns the camera rectangle into the window of world
//! tiles the render-list builder walks.

use crate::math::{self, Rect, TilePos, Vec2, TILE_STEP_X, TILE_STEP_Y};
use crate::world::World;

/// Fixed pixel margin around the viewport so art taller or wider than one
/// tile still enters the walk while its anchor tile is off-screen.
pub const VIEW_MARGIN_PX: f32 = 250.0;

/// Objects more than this far above the player are roof/ceiling tiles and are
/// culled entirely.
pub const ROOF_Z_OFFSET: i32 = 16;

/// The game viewport: a screen rectangle and a zoom factor.
///
/// `bounds` is in logical pixels. Under the global scale factor the driver
/// sets it to the surface size divided by the scale and feeds cursor
/// positions in the same space; the compositor's upscale pass maps logical
/// to physical.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub bounds: Rect,
    pub zoom: f32,
}

impl Camera {
    pub fn new(bounds: Rect) -> Self {
        Self { bounds, zoom: 1.0 }
    }

    /// Screen position of a world point, with the player centered.
    pub fn world_to_screen(&self, anchor: TilePos, pos: TilePos) -> Vec2 {
        let delta = math::iso_project(pos) - math::iso_project(anchor);
        self.bounds.center() + delta * self.zoom
    }

    /// Tile under a screen point, given the centered anchor tile.
    pub fn screen_to_tile(&self, anchor: TilePos, screen: Vec2) -> (i32, i32) {
        let iso = (screen - self.bounds.center()) * (1.0 / self.zoom) + math::iso_project(anchor);
        math::iso_unproject(iso)
    }
}

/// Inclusive tile-coordinate bounds for one frame's walk, plus the shared
/// roof cutoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileWindow {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
    pub max_ground_z: i32,
}

impl TileWindow {
    pub const EMPTY: TileWindow = TileWindow {
        min_x: 0,
        min_y: 0,
        max_x: -1,
        max_y: -1,
        max_ground_z: i32::MAX,
    };

    pub fn is_empty(&self) -> bool {
        self.max_x < self.min_x || self.max_y < self.min_y
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn width(&self) -> i32 {
        (self.max_x - self.min_x + 1).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.max_y - self.min_y + 1).max(0)
    }
}

/// Computes the tile window covering the camera's visible diamond.
///
/// Returns the empty window when the world is not in game, which in turn
/// idles the whole draw pipeline for the frame.
pub fn compute_tile_window(camera: &Camera, world: &World) -> TileWindow {
    let player = match (world.in_game, world.player_pos()) {
        (true, Some(pos)) => pos,
        _ => return TileWindow::EMPTY,
    };

    let zoom = camera.zoom.max(0.1);
    let half_w = camera.bounds.width / zoom * 0.5 + VIEW_MARGIN_PX;
    let half_h = camera.bounds.height / zoom * 0.5 + VIEW_MARGIN_PX;

    // The screen X extent bounds (x - y), the Y extent bounds (x + y); the
    // axis-aligned tile radius is the half-sum of both spans.
    let radius = ((half_w / TILE_STEP_X + half_h / TILE_STEP_Y) * 0.5).ceil() as i32;

    TileWindow {
        min_x: player.x - radius,
        min_y: player.y - radius,
        max_x: player.x + radius,
        max_y: player.y + radius,
        max_ground_z: player.z + ROOF_Z_OFFSET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{GameObject, ObjKind};

    fn world_with_player(pos: TilePos) -> World {
        let mut world = World::new();
        let player = world.insert(GameObject::new(
            0x0190,
            pos,
            ObjKind::Mobile(Default::default()),
        ));
        world.set_player(player);
        world.in_game = true;
        world
    }

    #[test]
    fn window_always_contains_the_player_tile() {
        let world = world_with_player(TilePos::new(100, 100, 0));
        for (w, h, zoom) in [
            (1.0, 1.0, 1.0),
            (800.0, 600.0, 1.0),
            (1920.0, 1080.0, 0.5),
            (640.0, 480.0, 2.0),
        ] {
            let camera = Camera {
                bounds: Rect::new(0.0, 0.0, w, h),
                zoom,
            };
            let window = compute_tile_window(&camera, &world);
            assert!(window.contains(100, 100), "{}x{} @ {}", w, h, zoom);
        }
    }

    #[test]
    fn window_is_empty_when_not_in_game() {
        let mut world = world_with_player(TilePos::new(0, 0, 0));
        world.in_game = false;
        let camera = Camera::new(Rect::new(0.0, 0.0, 800.0, 600.0));
        assert!(compute_tile_window(&camera, &world).is_empty());
    }

    #[test]
    fn roof_cutoff_tracks_player_height() {
        let world = world_with_player(TilePos::new(10, 10, 20));
        let camera = Camera::new(Rect::new(0.0, 0.0, 800.0, 600.0));
        let window = compute_tile_window(&camera, &world);
        assert_eq!(window.max_ground_z, 20 + ROOF_Z_OFFSET);
    }

    #[test]
    fn zooming_out_widens_the_window() {
        let world = world_with_player(TilePos::new(50, 50, 0));
        let mut camera = Camera::new(Rect::new(0.0, 0.0, 800.0, 600.0));
        let near = compute_tile_window(&camera, &world);
        camera.zoom = 0.5;
        let far = compute_tile_window(&camera, &world);
        assert!(far.width() > near.width());
    }
}
