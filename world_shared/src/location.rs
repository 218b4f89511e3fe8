//! World coordinates.
//!
//! The world is one flat integer grid. Planes (ground, first floor, second
//! floor, dungeon) are stacked along the Y axis in bands of [`PLANE_HEIGHT`]
//! rows, so a plane change is a fixed Y offset and Chebyshev distance between
//! two planes is always large.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Largest valid X coordinate.
pub const MAX_X: i32 = 944;
/// Largest valid Y coordinate.
pub const MAX_Y: i32 = 3776;
/// Rows per plane.
pub const PLANE_HEIGHT: i32 = 944;
/// Number of stacked planes.
pub const PLANES: i32 = MAX_Y / PLANE_HEIGHT;

/// Facing direction, numbered the way the client sprites are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    North = 0,
    NorthWest = 1,
    West = 2,
    SouthWest = 3,
    South = 4,
    SouthEast = 5,
    East = 6,
    NorthEast = 7,
}

impl Direction {
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => Direction::NorthWest,
            2 => Direction::West,
            3 => Direction::SouthWest,
            4 => Direction::South,
            5 => Direction::SouthEast,
            6 => Direction::East,
            7 => Direction::NorthEast,
            _ => Direction::North,
        }
    }

    /// Direction of travel for a signed step. X grows westward and Y grows
    /// southward.
    pub fn from_delta(dx: i32, dy: i32) -> Self {
        match (dx.signum(), dy.signum()) {
            (-1, -1) => Direction::NorthEast,
            (0, -1) => Direction::North,
            (1, -1) => Direction::NorthWest,
            (-1, 0) => Direction::East,
            (1, 0) => Direction::West,
            (-1, 1) => Direction::SouthEast,
            (0, 1) => Direction::South,
            (1, 1) => Direction::SouthWest,
            _ => Direction::North,
        }
    }
}

/// A tile in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Placeholder location used for dead mobs; never inside any cell's view.
    pub const DEATH_SPOT: Location = Location::new(0, 0);

    /// Where new characters start.
    pub const SPAWN: Location = Location::new(122, 657);

    /// Plane index in `0..PLANES`. The last row, `MAX_Y`, belongs to the
    /// bottom plane.
    pub fn plane(&self) -> i32 {
        (self.y / PLANE_HEIGHT).min(PLANES - 1)
    }

    /// True when the coordinates lie inside the world bounds.
    pub fn is_valid(&self) -> bool {
        within_world(self.x, self.y)
    }

    /// Chebyshev distance.
    pub fn longest_delta(&self, other: &Location) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn within_range(&self, other: &Location, radius: i32) -> bool {
        self.longest_delta(other) <= radius
    }

    pub fn direction_to(&self, x: i32, y: i32) -> Direction {
        Direction::from_delta(x - self.x, y - self.y)
    }

    /// Same tile one floor up. The dungeon plane leads up to the ground.
    pub fn above(&self) -> Location {
        match self.plane() {
            0 | 1 => Location::new(self.x, self.y + PLANE_HEIGHT),
            3 => Location::new(self.x, (self.y - 3 * PLANE_HEIGHT).min(PLANE_HEIGHT - 1)),
            _ => *self,
        }
    }

    /// Same tile one floor down. The ground leads down into the dungeon.
    pub fn below(&self) -> Location {
        match self.plane() {
            1 | 2 => Location::new(self.x, self.y - PLANE_HEIGHT),
            0 => Location::new(self.x, self.y + 3 * PLANE_HEIGHT),
            _ => *self,
        }
    }

    /// Uniformly random tile inside the inclusive rectangle `min..=max`.
    pub fn random_within<R: Rng + ?Sized>(min: Location, max: Location, rng: &mut R) -> Location {
        let (lo_x, hi_x) = (min.x.min(max.x), min.x.max(max.x));
        let (lo_y, hi_y) = (min.y.min(max.y), min.y.max(max.y));
        Location::new(rng.gen_range(lo_x..=hi_x), rng.gen_range(lo_y..=hi_y))
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// True when `(x, y)` lies inside the world bounds.
pub fn within_world(x: i32, y: i32) -> bool {
    (0..=MAX_X).contains(&x) && (0..=MAX_Y).contains(&y)
}
