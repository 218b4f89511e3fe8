//! The world index.
//!
//! Owns the spatial grid, the collision map, content definitions and the
//! per-kind registries of live entities. Created once and shared as
//! `Arc<World>` by the tick task and every connection.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    appearance::Appearance,
    collision::{CollisionMask, TileMap},
    definitions::Definitions,
    entity::{IndexPool, MobCore, MobRef, MobileEntity},
    grid::Grid,
    location::Location,
    lock,
    net::LoginCode,
    npc::Npc,
    object::GameObject,
    player::{Player, Session},
    skills::{SkillTable, ATTACK, DEFENSE, HITS, STRENGTH},
};

/// NPC index space.
pub const MAX_NPCS: usize = 16_384;
/// Object index space.
pub const MAX_OBJECTS: usize = 65_536;

pub struct World {
    grid: Grid,
    collision: TileMap,
    definitions: Definitions,
    players: RwLock<BTreeMap<usize, Arc<Player>>>,
    npcs: RwLock<BTreeMap<usize, Arc<Npc>>>,
    objects: RwLock<BTreeMap<usize, Arc<GameObject>>>,
    player_indices: Mutex<IndexPool>,
    npc_indices: Mutex<IndexPool>,
    object_indices: Mutex<IndexPool>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("players", &self.player_count())
            .field("npcs", &lock::read(&self.npcs).len())
            .field("objects", &lock::read(&self.objects).len())
            .finish()
    }
}

impl World {
    pub fn new(max_players: usize, definitions: Definitions) -> Self {
        Self {
            grid: Grid::new(),
            collision: TileMap::new(),
            definitions,
            players: RwLock::new(BTreeMap::new()),
            npcs: RwLock::new(BTreeMap::new()),
            objects: RwLock::new(BTreeMap::new()),
            player_indices: Mutex::new(IndexPool::new(max_players)),
            npc_indices: Mutex::new(IndexPool::new(MAX_NPCS)),
            object_indices: Mutex::new(IndexPool::new(MAX_OBJECTS)),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn collision(&self) -> &TileMap {
        &self.collision
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Spawns every NPC and object listed in the definitions.
    pub fn populate(&self) {
        let mut npcs = 0;
        for spawn in &self.definitions.npc_spawns {
            if self.spawn_npc(spawn.id, spawn.start, spawn.min, spawn.max).is_some() {
                npcs += 1;
            }
        }
        let mut objects = 0;
        for spawn in &self.definitions.object_spawns {
            if self
                .add_object(spawn.id, spawn.location, spawn.direction, spawn.boundary)
                .is_some()
            {
                objects += 1;
            }
        }
        info!(npcs, objects, "World populated");
    }

    // ─── Players ───

    /// Registers a freshly logged-in player.
    pub fn add_player(
        &self,
        username: &str,
        location: Location,
        skills: SkillTable,
        appearance: Appearance,
        session: Session,
    ) -> Result<Arc<Player>, LoginCode> {
        let mut players = lock::write(&self.players);
        if players
            .values()
            .any(|p| p.username().eq_ignore_ascii_case(username))
        {
            return Err(LoginCode::AlreadyOnline);
        }
        let Some(index) = lock::lock(&self.player_indices).acquire() else {
            return Err(LoginCode::WorldFull);
        };
        let location = if location.is_valid() {
            location
        } else {
            warn!(%username, %location, "Stored location is outside the world");
            Location::SPAWN
        };
        let player = Arc::new(Player::new(
            index, username, location, skills, appearance, session,
        ));
        players.insert(index, Arc::clone(&player));
        drop(players);
        self.grid.cell_for(location).add_player(Arc::clone(&player));
        debug!(index, %username, %location, "Player registered");
        Ok(player)
    }

    /// Deregisters a player and frees its index. Returns `None` when the
    /// player is already gone.
    pub fn remove_player(&self, index: usize) -> Option<Arc<Player>> {
        let player = lock::write(&self.players).remove(&index)?;
        // Flag and unregister under the location lock so a tick still
        // holding this player can not move it back into a cell.
        {
            let loc = lock::write(player.core().location_lock());
            player.begin_removal();
            if !self.grid.cell_for(*loc).remove_player(index) {
                warn!(index, location = %*loc, "Player missing from its cell");
            }
        }
        lock::lock(&self.player_indices).release(index);
        debug!(index, username = %player.username(), "Player deregistered");
        Some(player)
    }

    pub fn player(&self, index: usize) -> Option<Arc<Player>> {
        lock::read(&self.players).get(&index).cloned()
    }

    pub fn player_by_name(&self, username: &str) -> Option<Arc<Player>> {
        lock::read(&self.players)
            .values()
            .find(|p| p.username().eq_ignore_ascii_case(username))
            .cloned()
    }

    /// Snapshot of every registered player, in index order.
    pub fn players(&self) -> Vec<Arc<Player>> {
        lock::read(&self.players).values().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        lock::read(&self.players).len()
    }

    /// Players inside the view cells around `center` within `radius`.
    pub fn players_near(&self, center: Location, radius: i32) -> Vec<Arc<Player>> {
        self.grid
            .cells_around(center.x, center.y)
            .iter()
            .flat_map(|c| c.players())
            .filter(|p| p.location().within_range(&center, radius))
            .collect()
    }

    // ─── NPCs ───

    /// Spawns an NPC using its definition's base stats. Unknown definition
    /// ids are reported and skipped.
    pub fn spawn_npc(&self, id: u32, start: Location, min: Location, max: Location) -> Option<Arc<Npc>> {
        let Some(def) = self.definitions.npc(id) else {
            warn!(id, "No NPC definition");
            return None;
        };
        if !start.is_valid() {
            warn!(id, %start, "NPC spawn outside the world");
            return None;
        }
        let index = lock::lock(&self.npc_indices).acquire()?;
        let skills = SkillTable::new();
        skills.set_level(ATTACK, def.attack);
        skills.set_level(DEFENSE, def.defense);
        skills.set_level(STRENGTH, def.strength);
        skills.set_level(HITS, def.hits);
        let npc = Arc::new(Npc::new(index, id, start, min, max, skills));
        lock::write(&self.npcs).insert(index, Arc::clone(&npc));
        self.grid.cell_for(start).add_npc(Arc::clone(&npc));
        Some(npc)
    }

    pub fn remove_npc(&self, index: usize) -> Option<Arc<Npc>> {
        let npc = lock::write(&self.npcs).remove(&index)?;
        {
            let loc = lock::read(npc.core().location_lock());
            self.grid.cell_for(*loc).remove_npc(index);
        }
        lock::lock(&self.npc_indices).release(index);
        Some(npc)
    }

    pub fn npc(&self, index: usize) -> Option<Arc<Npc>> {
        lock::read(&self.npcs).get(&index).cloned()
    }

    pub fn npcs(&self) -> Vec<Arc<Npc>> {
        lock::read(&self.npcs).values().cloned().collect()
    }

    // ─── Objects ───

    pub fn add_object(&self, id: u32, location: Location, direction: u8, boundary: bool) -> Option<Arc<GameObject>> {
        if !location.is_valid() {
            warn!(id, %location, "Object outside the world");
            return None;
        }
        let index = lock::lock(&self.object_indices).acquire()?;
        let object = Arc::new(GameObject {
            index,
            id,
            location,
            direction,
            boundary,
        });
        lock::write(&self.objects).insert(index, Arc::clone(&object));
        self.grid.cell_for(location).add_object(Arc::clone(&object));
        self.apply_collision(&object, true);
        Some(object)
    }

    pub fn remove_object(&self, index: usize) -> Option<Arc<GameObject>> {
        let object = lock::write(&self.objects).remove(&index)?;
        self.grid.cell_for(object.location).remove_object(index);
        self.apply_collision(&object, false);
        lock::lock(&self.object_indices).release(index);
        Some(object)
    }

    /// Swaps `object` for another definition in the same spot, e.g. an open
    /// door for a closed one.
    pub fn replace_object(&self, object: &GameObject, id: u32) -> Option<Arc<GameObject>> {
        self.remove_object(object.index)?;
        self.add_object(id, object.location, object.direction, object.boundary)
    }

    /// The object standing on `location`, preferring scenery over boundaries.
    pub fn object_at(&self, location: Location) -> Option<Arc<GameObject>> {
        if !location.is_valid() {
            return None;
        }
        let mut found: Vec<_> = self
            .grid
            .cell_for(location)
            .objects()
            .into_iter()
            .filter(|o| o.location == location)
            .collect();
        found.sort_by_key(|o| o.boundary);
        found.into_iter().next()
    }

    pub fn object(&self, index: usize) -> Option<Arc<GameObject>> {
        lock::read(&self.objects).get(&index).cloned()
    }

    fn apply_collision(&self, object: &GameObject, add: bool) {
        let solid = self
            .definitions
            .object(object.id)
            .is_some_and(|d| d.solid);
        if !solid {
            return;
        }
        let Location { x, y } = object.location;
        let edges: &[((i32, i32), CollisionMask)] = match (object.boundary, object.direction) {
            (true, 0) => &[((0, 0), CollisionMask::NORTH), ((0, -1), CollisionMask::SOUTH)],
            (true, 1) => &[((0, 0), CollisionMask::EAST), ((-1, 0), CollisionMask::WEST)],
            _ => &[((0, 0), CollisionMask::FULL_BLOCK)],
        };
        for &((dx, dy), mask) in edges {
            if add {
                self.collision.add(x + dx, y + dy, mask);
            } else {
                self.collision.clear(x + dx, y + dy, mask);
            }
        }
    }

    // ─── Mobs ───

    /// Runs `f` on the core of the mob `r` points at, if it still exists.
    pub fn with_mob<T>(&self, r: MobRef, f: impl FnOnce(&MobCore) -> T) -> Option<T> {
        match r {
            MobRef::Player(i) => self.player(i).map(|p| f(p.core())),
            MobRef::Npc(i) => self.npc(i).map(|n| f(n.core())),
        }
    }

    /// Ends the fight `mob` is in, on both sides.
    pub fn reset_fighting(&self, mob: &dyn MobileEntity, now: DateTime<Utc>) {
        if let Some(target) = mob.core().fight_target() {
            self.with_mob(target, |t| t.end_fight(now));
        }
        mob.core().end_fight(now);
    }
}
