//! Spatial grid.
//!
//! The world is partitioned into 48×48 cells, each holding unordered
//! membership lists of the players, NPCs and objects inside it. Cells are
//! allocated on first access and then live as long as the grid.
//!
//! View queries look at four cells instead of a full 3×3 block: the
//! containing cell plus the neighbours on the side of the cell midpoint the
//! position falls on. That covers every tile within 24 tiles of the
//! position, which is more than any view radius.

use std::sync::{Arc, OnceLock, RwLock};

use tracing::warn;

use crate::{
    entity::MobileEntity,
    location::{Location, MAX_X, MAX_Y},
    lock,
    npc::Npc,
    object::GameObject,
    player::Player,
};

/// Side length of a cell in tiles.
pub const CELL_SIZE: i32 = 48;
/// Offset within a cell at or below which the lower neighbour is chosen.
pub const CELL_MIDPOINT: i32 = CELL_SIZE / 2;
/// Cell columns.
pub const HORIZONTAL_CELLS: usize = (MAX_X / CELL_SIZE + 1) as usize;
/// Cell rows.
pub const VERTICAL_CELLS: usize = (MAX_Y / CELL_SIZE + 1) as usize;

#[derive(Debug, Default)]
struct Members {
    players: Vec<Arc<Player>>,
    npcs: Vec<Arc<Npc>>,
    objects: Vec<Arc<GameObject>>,
}

/// One bucket of the grid.
#[derive(Debug, Default)]
pub struct Cell {
    members: RwLock<Members>,
}

impl Cell {
    pub fn add_player(&self, p: Arc<Player>) {
        lock::write(&self.members).players.push(p);
    }

    /// Removes the player with `index`. Order of the remaining members is
    /// not preserved.
    pub fn remove_player(&self, index: usize) -> bool {
        let mut m = lock::write(&self.members);
        match m.players.iter().position(|p| p.index() == index) {
            Some(i) => {
                m.players.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn add_npc(&self, n: Arc<Npc>) {
        lock::write(&self.members).npcs.push(n);
    }

    pub fn remove_npc(&self, index: usize) -> bool {
        let mut m = lock::write(&self.members);
        match m.npcs.iter().position(|n| n.index() == index) {
            Some(i) => {
                m.npcs.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn add_object(&self, o: Arc<GameObject>) {
        lock::write(&self.members).objects.push(o);
    }

    pub fn remove_object(&self, index: usize) -> bool {
        let mut m = lock::write(&self.members);
        match m.objects.iter().position(|o| o.index == index) {
            Some(i) => {
                m.objects.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the players in this cell.
    pub fn players(&self) -> Vec<Arc<Player>> {
        lock::read(&self.members).players.clone()
    }

    pub fn npcs(&self) -> Vec<Arc<Npc>> {
        lock::read(&self.members).npcs.clone()
    }

    pub fn objects(&self) -> Vec<Arc<GameObject>> {
        lock::read(&self.members).objects.clone()
    }

    pub fn has_players(&self) -> bool {
        !lock::read(&self.members).players.is_empty()
    }

    pub fn contains_player(&self, index: usize) -> bool {
        lock::read(&self.members)
            .players
            .iter()
            .any(|p| p.index() == index)
    }

    pub fn contains_npc(&self, index: usize) -> bool {
        lock::read(&self.members).npcs.iter().any(|n| n.index() == index)
    }
}

/// Dense, lazily populated 2-D array of cells covering the world.
pub struct Grid {
    cells: Vec<OnceLock<Arc<Cell>>>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("allocated", &self.allocated())
            .finish()
    }
}

impl Grid {
    pub fn new() -> Self {
        let mut cells = Vec::with_capacity(HORIZONTAL_CELLS * VERTICAL_CELLS);
        cells.resize_with(HORIZONTAL_CELLS * VERTICAL_CELLS, OnceLock::new);
        Self { cells }
    }

    /// Cell column/row for world coordinates, if they are in bounds.
    pub fn cell_coords(x: i32, y: i32) -> Option<(i32, i32)> {
        if x < 0 || y < 0 || x > MAX_X || y > MAX_Y {
            return None;
        }
        Some((x / CELL_SIZE, y / CELL_SIZE))
    }

    fn cell_by_coords(&self, cx: i32, cy: i32) -> Arc<Cell> {
        // Neighbours past the world edge degrade quietly; callers asking for
        // an out-of-bounds tile are reported in `cell_at`.
        if cx < 0 || cy < 0 || cx as usize >= HORIZONTAL_CELLS || cy as usize >= VERTICAL_CELLS {
            return Arc::new(Cell::default());
        }
        let slot = &self.cells[cy as usize * HORIZONTAL_CELLS + cx as usize];
        Arc::clone(slot.get_or_init(|| Arc::new(Cell::default())))
    }

    /// Cell owning `(x, y)`. Out-of-bounds coordinates get an empty cell
    /// that is not part of the grid.
    pub fn cell_at(&self, x: i32, y: i32) -> Arc<Cell> {
        match Self::cell_coords(x, y) {
            Some((cx, cy)) => self.cell_by_coords(cx, cy),
            None => {
                warn!(x, y, "Coordinates outside the world");
                Arc::new(Cell::default())
            }
        }
    }

    pub fn cell_for(&self, l: Location) -> Arc<Cell> {
        self.cell_at(l.x, l.y)
    }

    /// The containing cell followed by the three neighbours closest to
    /// `(x, y)`: horizontal, diagonal, vertical.
    pub fn cells_around(&self, x: i32, y: i32) -> [Arc<Cell>; 4] {
        let Some((cx, cy)) = Self::cell_coords(x, y) else {
            warn!(x, y, "Coordinates outside the world");
            return std::array::from_fn(|_| Arc::new(Cell::default()));
        };
        let dx = if x % CELL_SIZE <= CELL_MIDPOINT { -1 } else { 1 };
        let dy = if y % CELL_SIZE <= CELL_MIDPOINT { -1 } else { 1 };
        [
            self.cell_by_coords(cx, cy),
            self.cell_by_coords(cx + dx, cy),
            self.cell_by_coords(cx + dx, cy + dy),
            self.cell_by_coords(cx, cy + dy),
        ]
    }

    /// Players within `radius` tiles of `center`, gathered from every cell
    /// the square `center ± radius` touches. Use this instead of
    /// [`Grid::cells_around`] when the radius exceeds half a cell.
    pub fn players_within(&self, center: Location, radius: i32) -> Vec<Arc<Player>> {
        let (lo_x, hi_x) = ((center.x - radius).max(0), (center.x + radius).min(MAX_X));
        let (lo_y, hi_y) = ((center.y - radius).max(0), (center.y + radius).min(MAX_Y));
        if lo_x > hi_x || lo_y > hi_y {
            return Vec::new();
        }
        let mut found = Vec::new();
        for cy in lo_y / CELL_SIZE..=hi_y / CELL_SIZE {
            for cx in lo_x / CELL_SIZE..=hi_x / CELL_SIZE {
                found.extend(
                    self.cell_by_coords(cx, cy)
                        .players()
                        .into_iter()
                        .filter(|p| p.location().within_range(&center, radius)),
                );
            }
        }
        found
    }

    /// True when both locations fall in the same grid cell.
    pub fn same_cell(a: Location, b: Location) -> bool {
        Self::cell_coords(a.x, a.y) == Self::cell_coords(b.x, b.y)
    }

    /// Number of cells allocated so far.
    pub fn allocated(&self) -> usize {
        self.cells.iter().filter(|c| c.get().is_some()).count()
    }
}
