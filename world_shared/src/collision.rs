//! Tile collision.
//!
//! Walls sit on tile edges, so whether a step is legal depends on both the
//! tile being left (a wall on the side of travel) and the tile being entered
//! (a wall on the side it is entered from, or a solid object filling it).

use std::collections::HashMap;
use std::sync::RwLock;

use crate::{location::within_world, lock};

bitflags::bitflags! {
    /// Blocking bits for a single tile. Edge names follow the client's
    /// compass: north is -Y, east is -X.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CollisionMask: u8 {
        const NORTH = 1 << 0;
        const EAST = 1 << 1;
        const SOUTH = 1 << 2;
        const WEST = 1 << 3;
        const FULL_BLOCK = 1 << 4;
    }
}

/// Source of tile blocking information.
pub trait CollisionMap: Send + Sync {
    /// Blocking bits at `(x, y)`.
    fn mask(&self, x: i32, y: i32) -> CollisionMask;

    /// True when the tile at `(x, y)` blocks movement across `edge`.
    ///
    /// `leaving` selects the check for the tile the mob is standing on: only
    /// the wall on that edge counts. For the tile being entered a solid tile
    /// blocks from every side. Tiles outside the world always block.
    fn is_tile_blocking(&self, x: i32, y: i32, edge: CollisionMask, leaving: bool) -> bool {
        if !within_world(x, y) {
            return true;
        }
        let mask = self.mask(x, y);
        if mask.intersects(edge) {
            return true;
        }
        !leaving && mask.contains(CollisionMask::FULL_BLOCK)
    }
}

/// Sparse in-memory collision map. Unknown tiles are open.
#[derive(Debug, Default)]
pub struct TileMap {
    tiles: RwLock<HashMap<(i32, i32), CollisionMask>>,
}

impl TileMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, x: i32, y: i32, mask: CollisionMask) {
        let mut tiles = lock::write(&self.tiles);
        if mask.is_empty() {
            tiles.remove(&(x, y));
        } else {
            tiles.insert((x, y), mask);
        }
    }

    pub fn add(&self, x: i32, y: i32, mask: CollisionMask) {
        let mut tiles = lock::write(&self.tiles);
        let entry = tiles.entry((x, y)).or_default();
        *entry |= mask;
    }

    pub fn clear(&self, x: i32, y: i32, mask: CollisionMask) {
        let mut tiles = lock::write(&self.tiles);
        if let Some(entry) = tiles.get_mut(&(x, y)) {
            entry.remove(mask);
            if entry.is_empty() {
                tiles.remove(&(x, y));
            }
        }
    }

    /// Puts a wall on the shared edge between `(x, y)` and its neighbour in
    /// the `edge` direction, so the edge blocks from both sides.
    pub fn add_wall(&self, x: i32, y: i32, edge: CollisionMask) {
        self.add(x, y, edge);
        if edge.contains(CollisionMask::NORTH) {
            self.add(x, y - 1, CollisionMask::SOUTH);
        }
        if edge.contains(CollisionMask::SOUTH) {
            self.add(x, y + 1, CollisionMask::NORTH);
        }
        if edge.contains(CollisionMask::EAST) {
            self.add(x - 1, y, CollisionMask::WEST);
        }
        if edge.contains(CollisionMask::WEST) {
            self.add(x + 1, y, CollisionMask::EAST);
        }
    }
}

impl CollisionMap for TileMap {
    fn mask(&self, x: i32, y: i32) -> CollisionMask {
        lock::read(&self.tiles)
            .get(&(x, y))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_tile_blocks_entry_but_not_exit() {
        let map = TileMap::new();
        map.set(5, 5, CollisionMask::FULL_BLOCK);
        assert!(map.is_tile_blocking(5, 5, CollisionMask::NORTH, false));
        assert!(!map.is_tile_blocking(5, 5, CollisionMask::NORTH, true));
    }

    #[test]
    fn wall_blocks_from_both_sides() {
        let map = TileMap::new();
        map.add_wall(10, 10, CollisionMask::NORTH);
        // Leaving (10,10) northward.
        assert!(map.is_tile_blocking(10, 10, CollisionMask::NORTH, true));
        // Entering (10,9) from the south.
        assert!(map.is_tile_blocking(10, 9, CollisionMask::SOUTH, false));
        // Other edges stay open.
        assert!(!map.is_tile_blocking(10, 10, CollisionMask::EAST, true));
    }

    #[test]
    fn outside_world_always_blocks() {
        let map = TileMap::new();
        assert!(map.is_tile_blocking(-1, 0, CollisionMask::EAST, false));
        map.set(3, 3, CollisionMask::FULL_BLOCK);
        map.clear(3, 3, CollisionMask::FULL_BLOCK);
        assert!(map.mask(3, 3).is_empty());
    }
}
