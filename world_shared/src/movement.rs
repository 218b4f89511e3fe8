//! Per-tick path traversal.
//!
//! A mob with a path takes at most one tile step per tick toward its next
//! waypoint: the Y axis is resolved first, then X on the row the Y step
//! lands on, so diagonal steps are possible. Every step is checked against
//! the tile-edge collision model both on the tile being left and on the
//! tile being entered; a step that cannot make progress drops the path.

use std::sync::Arc;

use crate::{
    collision::{CollisionMap, CollisionMask},
    entity::MobileEntity,
    grid::Grid,
    location::Location,
};

/// What one traversal step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The mob had no path.
    Idle,
    /// The path ran out; it has been cleared.
    Arrived,
    /// Terrain stopped the mob; the path has been cleared.
    Blocked,
    /// The mob moved onto this tile.
    Moved(Location),
}

/// Advances `mob` one tile along its path.
pub fn traverse_path<M: MobileEntity>(mob: &Arc<M>, grid: &Grid, map: &dyn CollisionMap) -> Step {
    let core = mob.core();
    let Some(mut path) = core.path() else {
        return Step::Idle;
    };
    let here = core.location();
    if path.next_waypoint() == Some(here) {
        path.advance();
    }
    let dst = match path.next_waypoint() {
        Some(tile) if tile.is_valid() => tile,
        _ => {
            core.reset_path();
            return Step::Arrived;
        }
    };

    let (x, y) = (here.x, here.y);
    let mut next = here;
    let (mut x_blocked, mut y_blocked) = (false, false);
    let (mut new_x_blocked, mut new_y_blocked) = (false, false);

    if y > dst.y {
        y_blocked = map.is_tile_blocking(x, y, CollisionMask::NORTH, true);
        new_y_blocked = map.is_tile_blocking(x, y - 1, CollisionMask::SOUTH, false);
        if !new_y_blocked {
            next.y -= 1;
        }
    } else if y < dst.y {
        y_blocked = map.is_tile_blocking(x, y, CollisionMask::SOUTH, true);
        new_y_blocked = map.is_tile_blocking(x, y + 1, CollisionMask::NORTH, false);
        if !new_y_blocked {
            next.y += 1;
        }
    }
    if x > dst.x {
        x_blocked = map.is_tile_blocking(x, next.y, CollisionMask::EAST, true);
        new_x_blocked = map.is_tile_blocking(x - 1, next.y, CollisionMask::WEST, false);
        if !new_x_blocked {
            next.x -= 1;
        }
    } else if x < dst.x {
        x_blocked = map.is_tile_blocking(x, next.y, CollisionMask::WEST, true);
        new_x_blocked = map.is_tile_blocking(x + 1, next.y, CollisionMask::EAST, false);
        if !new_x_blocked {
            next.x += 1;
        }
    }

    if (x_blocked && y_blocked) || (x_blocked && y == dst.y) || (y_blocked && x == dst.x) {
        core.reset_path();
        return Step::Blocked;
    }
    if (new_x_blocked && new_y_blocked)
        || (new_x_blocked && x != next.x && y == next.y)
        || (new_y_blocked && y != next.y && x == next.x)
    {
        core.reset_path();
        return Step::Blocked;
    }

    // Re-check the chosen tile from the sides it is actually entered on.
    if next.x > x {
        new_x_blocked = map.is_tile_blocking(next.x, next.y, CollisionMask::EAST, false);
    } else if next.x < x {
        new_x_blocked = map.is_tile_blocking(next.x, next.y, CollisionMask::WEST, false);
    }
    if next.y > y {
        new_y_blocked = map.is_tile_blocking(next.x, next.y, CollisionMask::NORTH, false);
    } else if next.y < y {
        new_y_blocked = map.is_tile_blocking(next.x, next.y, CollisionMask::SOUTH, false);
    }
    if (new_x_blocked && new_y_blocked)
        || (new_x_blocked && y == next.y)
        || (new_y_blocked && x == next.x)
        || next == here
    {
        core.reset_path();
        return Step::Blocked;
    }

    core.set_path(path);
    mob.set_location(grid, next, false);
    Step::Moved(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        appearance::Appearance,
        collision::TileMap,
        location::Direction,
        pathway::Pathway,
        player::{Player, Session},
        skills::SkillTable,
    };

    fn walker(grid: &Grid, at: Location) -> Arc<Player> {
        let (session, _rx) = Session::new(4);
        let p = Arc::new(Player::new(
            0,
            "walker",
            at,
            SkillTable::starting(),
            Appearance::default(),
            session,
        ));
        grid.cell_for(at).add_player(Arc::clone(&p));
        p
    }

    #[test]
    fn walks_diagonally_then_straight() {
        let grid = Grid::new();
        let map = TileMap::new();
        let p = walker(&grid, Location::new(100, 100));
        p.core().walk_to(Location::new(102, 103));

        assert_eq!(traverse_path(&p, &grid, &map), Step::Moved(Location::new(101, 101)));
        assert_eq!(p.core().direction(), Direction::SouthWest);
        assert!(p.core().has_moved());
        assert_eq!(traverse_path(&p, &grid, &map), Step::Moved(Location::new(102, 102)));
        assert_eq!(traverse_path(&p, &grid, &map), Step::Moved(Location::new(102, 103)));
        assert_eq!(p.core().direction(), Direction::South);
        assert_eq!(traverse_path(&p, &grid, &map), Step::Arrived);
        assert!(p.core().path().is_none());
        assert_eq!(traverse_path(&p, &grid, &map), Step::Idle);
    }

    #[test]
    fn multi_waypoint_path_turns_corners() {
        let grid = Grid::new();
        let map = TileMap::new();
        let p = walker(&grid, Location::new(50, 50));
        p.core().set_path(Pathway::new(vec![
            Location::new(50, 52),
            Location::new(48, 52),
        ]));
        let mut visited = Vec::new();
        while let Step::Moved(l) = traverse_path(&p, &grid, &map) {
            visited.push(l);
        }
        assert_eq!(
            visited,
            vec![
                Location::new(50, 51),
                Location::new(50, 52),
                Location::new(49, 52),
                Location::new(48, 52),
            ]
        );
    }

    #[test]
    fn wall_on_current_tile_stops_straight_walk() {
        let grid = Grid::new();
        let map = TileMap::new();
        map.add_wall(200, 200, CollisionMask::NORTH);
        let p = walker(&grid, Location::new(200, 200));
        p.core().walk_to(Location::new(200, 195));
        assert_eq!(traverse_path(&p, &grid, &map), Step::Blocked);
        assert_eq!(p.location(), Location::new(200, 200));
        assert!(p.core().path().is_none());
    }

    #[test]
    fn solid_tile_is_never_entered() {
        let grid = Grid::new();
        let map = TileMap::new();
        map.set(301, 300, CollisionMask::FULL_BLOCK);
        let p = walker(&grid, Location::new(300, 300));
        p.core().walk_to(Location::new(305, 300));
        assert_eq!(traverse_path(&p, &grid, &map), Step::Blocked);
        assert_eq!(p.location(), Location::new(300, 300));
    }

    #[test]
    fn solid_tile_ahead_on_straight_walk_blocks() {
        let grid = Grid::new();
        let map = TileMap::new();
        let p = walker(&grid, Location::new(0, 10));
        map.set(0, 9, CollisionMask::FULL_BLOCK);
        p.core().walk_to(Location::new(0, 5));
        assert_eq!(traverse_path(&p, &grid, &map), Step::Blocked);
    }
}
