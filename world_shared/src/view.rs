//! Per-player view synchronization.
//!
//! Each tick every connected player is diffed against what it was last told:
//! the entities now in range are compared with the remembered sets, the
//! difference becomes at most three messages (positions, appearances,
//! objects) and the remembered sets are replaced wholesale. Replacing rather
//! than patching means a bad tick can never leave a client permanently out
//! of step.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    entity::MobileEntity,
    grid::Cell,
    net::{
        AppearanceDelta, AppearanceUpdate, MobUpdate, NpcUpdate, ObjectDelta, ObjectUpdate,
        PositionDelta, ServerMsg,
    },
    npc::Npc,
    object::GameObject,
    player::{KnownSets, Player},
    world::World,
};

/// Players within this many tiles are visible.
pub const PLAYER_VIEW_RADIUS: i32 = 15;
/// NPCs within this many tiles are visible.
pub const NPC_VIEW_RADIUS: i32 = 15;
/// Objects within this many tiles are visible.
pub const OBJECT_VIEW_RADIUS: i32 = 20;

pub fn mob_update<M: MobileEntity>(m: &M) -> MobUpdate {
    MobUpdate {
        index: m.index(),
        location: m.location(),
        direction: m.core().direction(),
    }
}

pub fn npc_update(n: &Npc) -> NpcUpdate {
    NpcUpdate {
        index: n.index(),
        id: n.id(),
        location: n.location(),
        direction: n.core().direction(),
    }
}

pub fn object_update(o: &GameObject) -> ObjectUpdate {
    ObjectUpdate {
        index: o.index,
        id: o.id,
        location: o.location,
        direction: o.direction,
        boundary: o.boundary,
    }
}

pub fn appearance_update(p: &Player) -> AppearanceUpdate {
    AppearanceUpdate {
        index: p.index(),
        username: p.username().to_string(),
        appearance: p.appearance(),
        combat_level: p.skills().combat_level(),
    }
}

fn moved_or_changed<M: MobileEntity>(m: &M) -> bool {
    m.core().has_moved() || m.core().has_changed()
}

/// Builds this tick's messages for `player` and remembers what it now sees.
/// Players that are no longer connected get nothing.
pub fn sync_player(world: &World, player: &Arc<Player>) -> Vec<ServerMsg> {
    if !player.is_connected() {
        return Vec::new();
    }
    let here = player.location();
    let cells = world.grid().cells_around(here.x, here.y);
    let known = player.known();
    let mut seen = KnownSets::default();

    let mut positions = PositionDelta::default();
    let mut appearances = AppearanceDelta::default();
    let mut objects = ObjectDelta::default();

    let me = player.core();
    if me.has_moved() || me.has_changed() || me.was_removed() {
        positions.own = Some(mob_update(player.as_ref()));
    }
    if player.appearance_changed() {
        appearances.entries.push(appearance_update(player));
    }

    sync_players(player, &cells, &known.players, &mut seen.players, &mut positions, &mut appearances);
    sync_npcs(player, &cells, &known.npcs, &mut seen.npcs, &mut positions);
    sync_objects(player, &cells, &known.objects, &mut seen.objects, &mut objects);

    player.replace_known(seen);

    let mut out = Vec::with_capacity(3);
    if !positions.is_empty() {
        out.push(ServerMsg::Positions(positions));
    }
    if !appearances.entries.is_empty() {
        out.push(ServerMsg::Appearances(appearances));
    }
    if !objects.is_empty() {
        out.push(ServerMsg::Objects(objects));
    }
    out
}

fn sync_players(
    player: &Player,
    cells: &[Arc<Cell>],
    known: &HashSet<usize>,
    seen: &mut HashSet<usize>,
    positions: &mut PositionDelta,
    appearances: &mut AppearanceDelta,
) {
    let here = player.location();
    for other in cells.iter().flat_map(|c| c.players()) {
        let index = other.index();
        if index == player.index()
            || !other.is_connected()
            || !other.location().within_range(&here, PLAYER_VIEW_RADIUS)
        {
            continue;
        }
        if !seen.insert(index) {
            continue;
        }
        let update = mob_update(other.as_ref());
        if !known.contains(&index) {
            positions.players_entering.push(update);
            appearances.entries.push(appearance_update(&other));
            continue;
        }
        if other.core().was_removed() {
            positions.players_leaving.push(index);
            positions.players_entering.push(update);
            appearances.entries.push(appearance_update(&other));
            continue;
        }
        if moved_or_changed(other.as_ref()) {
            positions.players_moved.push(update);
        }
        if other.appearance_changed() {
            appearances.entries.push(appearance_update(&other));
        }
    }
    let mut leaving: Vec<usize> = known.difference(seen).copied().collect();
    leaving.sort_unstable();
    positions.players_leaving.extend(leaving);
}

fn sync_npcs(
    player: &Player,
    cells: &[Arc<Cell>],
    known: &HashSet<usize>,
    seen: &mut HashSet<usize>,
    positions: &mut PositionDelta,
) {
    let here = player.location();
    for npc in cells.iter().flat_map(|c| c.npcs()) {
        let index = npc.index();
        if !npc.location().within_range(&here, NPC_VIEW_RADIUS) || !seen.insert(index) {
            continue;
        }
        let update = npc_update(&npc);
        if !known.contains(&index) {
            positions.npcs_entering.push(update);
        } else if npc.core().was_removed() {
            positions.npcs_leaving.push(index);
            positions.npcs_entering.push(update);
        } else if moved_or_changed(npc.as_ref()) {
            positions.npcs_moved.push(update);
        }
    }
    let mut leaving: Vec<usize> = known.difference(seen).copied().collect();
    leaving.sort_unstable();
    positions.npcs_leaving.extend(leaving);
}

fn sync_objects(
    player: &Player,
    cells: &[Arc<Cell>],
    known: &HashMap<usize, ObjectUpdate>,
    seen: &mut HashMap<usize, ObjectUpdate>,
    objects: &mut ObjectDelta,
) {
    let here = player.location();
    for object in cells.iter().flat_map(|c| c.objects()) {
        if !object.location.within_range(&here, OBJECT_VIEW_RADIUS) {
            continue;
        }
        let update = object_update(&object);
        if seen.insert(object.index, update).is_some() {
            continue;
        }
        match known.get(&object.index) {
            Some(old) if *old == update => {}
            Some(old) => {
                objects.leaving.push(*old);
                objects.entering.push(update);
            }
            None => objects.entering.push(update),
        }
    }
    let mut leaving: Vec<ObjectUpdate> = known
        .iter()
        .filter(|(index, _)| !seen.contains_key(index))
        .map(|(_, old)| *old)
        .collect();
    leaving.sort_unstable_by_key(|o| o.index);
    objects.leaving.extend(leaving);
}
