//! Waypoint paths.

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// An ordered list of waypoint tiles plus a cursor into it.
///
/// Mobs walk toward `waypoints[cursor]` one tile per tick; reaching it moves
/// the cursor on. A path whose cursor has run off the end is finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Pathway {
    waypoints: Vec<Location>,
    cursor: usize,
}

impl Pathway {
    pub fn new(waypoints: Vec<Location>) -> Self {
        Self {
            waypoints,
            cursor: 0,
        }
    }

    /// Straight-line path to a single destination.
    pub fn to(end: Location) -> Self {
        Self::new(vec![end])
    }

    pub fn waypoints(&self) -> &[Location] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Tile the mob is currently heading for, if any remain.
    pub fn next_waypoint(&self) -> Option<Location> {
        self.waypoints.get(self.cursor).copied()
    }

    /// Last tile of the path.
    pub fn destination(&self) -> Option<Location> {
        self.waypoints.last().copied()
    }

    /// True when the cursor ran off the end or the next waypoint lies
    /// outside the world.
    pub fn is_finished(&self) -> bool {
        match self.next_waypoint() {
            Some(tile) => !tile.is_valid(),
            None => true,
        }
    }
}
