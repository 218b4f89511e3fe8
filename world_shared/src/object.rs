//! Static world objects (scenery and boundaries).

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// A static object placed in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameObject {
    pub index: usize,
    /// Definition id.
    pub id: u32,
    pub location: Location,
    pub direction: u8,
    /// Boundaries sit on tile edges (doors, fences); scenery fills a tile.
    pub boundary: bool,
}
