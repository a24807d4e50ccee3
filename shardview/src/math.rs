use glam::{Mat4, Vec3};

/// Half of an isometric tile's screen width in pixels.
pub const TILE_STEP_X: f32 = 22.0;
/// Half of an isometric tile's screen height in pixels.
pub const TILE_STEP_Y: f32 = 22.0;
/// Screen pixels per world Z unit.
pub const Z_STEP: f32 = 4.0;

/// 2D vector type used throughout shardview.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the squared length of the vector (faster than `length()`).
    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Computes the distance between two points.
    pub fn distance(self, rhs: Self) -> f32 {
        (self - rhs).length()
    }

    pub fn to_glam(&self) -> glam::Vec2 {
        glam::Vec2::new(self.x, self.y)
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from(value: (f32, f32)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

/// World tile position: signed tile coordinates plus a signed height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl TilePos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev distance in tiles, ignoring height.
    pub fn distance(self, rhs: Self) -> i32 {
        (self.x - rhs.x).abs().max((self.y - rhs.y).abs())
    }
}

/// Projects a world tile position to its screen-space anchor point.
///
/// The anchor is the top corner of the tile diamond; art is drawn relative
/// to it.
pub fn iso_project(pos: TilePos) -> Vec2 {
    Vec2::new(
        (pos.x - pos.y) as f32 * TILE_STEP_X,
        (pos.x + pos.y) as f32 * TILE_STEP_Y - pos.z as f32 * Z_STEP,
    )
}

/// Inverse of `iso_project` at ground level: screen point to the tile under it.
pub fn iso_unproject(screen: Vec2) -> (i32, i32) {
    let fx = screen.x / TILE_STEP_X;
    let fy = screen.y / TILE_STEP_Y;
    (
        ((fy + fx) * 0.5).floor() as i32,
        ((fy - fx) * 0.5).floor() as i32,
    )
}

/// Isometric depth key: larger keys draw in front.
///
/// The (x + y) diagonal dominates, then height, then a small per-kind bias so
/// that land sorts under statics standing on the same tile.
pub fn depth_key(pos: TilePos, bias: i32) -> i32 {
    ((pos.x + pos.y) << 8) + (pos.z << 2) + bias
}

/// Axis-aligned screen rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from two corner points in any order.
    ///
    /// The result always satisfies min <= max on both axes.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// One of the eight facing octants, clockwise from screen-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Octant index, 0 = North, increasing clockwise.
    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::NorthEast => 1,
            Direction::East => 2,
            Direction::SouthEast => 3,
            Direction::South => 4,
            Direction::SouthWest => 5,
            Direction::West => 6,
            Direction::NorthWest => 7,
        }
    }

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 8]
    }

    /// Maps a screen-space vector to the octant it points into.
    ///
    /// Screen-up is North; octant boundaries sit 22.5 degrees either side of
    /// each cardinal.
    pub fn from_screen_vector(v: Vec2) -> Self {
        // atan2 with y flipped so that screen-up is zero, clockwise positive.
        let angle = v.x.atan2(-v.y).to_degrees();
        let angle = if angle < 0.0 { angle + 360.0 } else { angle };
        let octant = ((angle + 22.5) / 45.0).floor() as usize;
        Self::from_index(octant)
    }

    /// Tile delta for one step in this direction.
    ///
    /// Screen-north moves diagonally through tile space: both coordinates
    /// shrink.
    pub fn tile_delta(self) -> (i32, i32) {
        match self {
            Direction::North => (-1, -1),
            Direction::NorthEast => (0, -1),
            Direction::East => (1, -1),
            Direction::SouthEast => (1, 0),
            Direction::South => (1, 1),
            Direction::SouthWest => (0, 1),
            Direction::West => (-1, 1),
            Direction::NorthWest => (-1, 0),
        }
    }
}

/// Orthographic view-projection for a screen-space pass, optionally scaled.
pub fn screen_projection(width: u32, height: u32, scale: f32) -> Mat4 {
    let projection = Mat4::orthographic_rh_gl(0.0, width as f32, height as f32, 0.0, -1.0, 1.0);
    projection * Mat4::from_scale(Vec3::new(scale, scale, 1.0))
}

/// Moves `current` toward `target` by at most `step`, never overshooting.
pub fn approach(current: u8, target: u8, step: u8) -> u8 {
    if current < target {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    }
}
