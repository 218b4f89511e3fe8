//! Tick-level scenarios driven straight against the world, without sockets.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;
use world_server::server::tick_world;
use world_shared::{
    appearance::Appearance,
    definitions::{Definitions, ObjectSpawn},
    entity::MobileEntity,
    location::Location,
    net::ServerMsg,
    npc::WANDER_ACTIVATION_RADIUS,
    player::{Player, Session},
    skills::SkillTable,
    world::World,
};
use world_tests::{npc_def, object_def};

fn join(world: &World, name: &str, at: Location) -> (Arc<Player>, mpsc::Receiver<ServerMsg>) {
    let (session, rx) = Session::new(64);
    let p = world
        .add_player(name, at, SkillTable::starting(), Appearance::default(), session)
        .expect("login");
    (p, rx)
}

fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn positions(msgs: &[ServerMsg]) -> Vec<&world_shared::net::PositionDelta> {
    msgs.iter()
        .filter_map(|m| match m {
            ServerMsg::Positions(d) => Some(d),
            _ => None,
        })
        .collect()
}

#[test]
fn players_in_neighbouring_cells_enter_and_leave_view() {
    let world = World::new(10, Definitions::default());
    let mut rng = StdRng::seed_from_u64(1);
    // Either side of the x = 48 cell border.
    let (alice, mut ra) = join(&world, "alice", Location::new(40, 100));
    let (bob, mut rb) = join(&world, "bob", Location::new(50, 100));

    tick_world(&world, Utc::now(), &mut rng);
    let a = drain(&mut ra);
    let b = drain(&mut rb);
    let pa = positions(&a);
    assert_eq!(pa.len(), 1);
    assert_eq!(pa[0].players_entering.len(), 1);
    assert_eq!(pa[0].players_entering[0].index, bob.index());
    assert!(positions(&b)[0]
        .players_entering
        .iter()
        .any(|u| u.index == alice.index()));
    assert!(a.iter().any(|m| matches!(m, ServerMsg::Appearances(d)
        if d.entries.iter().any(|e| e.username == "bob"))));

    // Nothing changed, nothing is resent.
    tick_world(&world, Utc::now(), &mut rng);
    assert!(drain(&mut ra).is_empty());
    assert!(drain(&mut rb).is_empty());

    // Bob walks 20 tiles west, leaving view on the way, then stands still.
    bob.core().walk_to(Location::new(70, 100));
    let (mut entered, mut left) = (0, 0);
    for _ in 0..30 {
        tick_world(&world, Utc::now(), &mut rng);
        for d in positions(&drain(&mut ra)) {
            entered += d.players_entering.iter().filter(|u| u.index == bob.index()).count();
            left += d.players_leaving.iter().filter(|&&i| i == bob.index()).count();
        }
        drain(&mut rb);
    }
    assert_eq!(bob.location(), Location::new(70, 100));
    assert_eq!(left, 1);
    assert_eq!(entered, 0);
    assert!(alice.known().players.is_empty());
    assert!(bob.known().players.is_empty());
}

#[test]
fn teleported_player_leaves_view() {
    let world = World::new(10, Definitions::default());
    let mut rng = StdRng::seed_from_u64(6);
    let (alice, mut ra) = join(&world, "alice", Location::new(40, 100));
    let (bob, _rb) = join(&world, "bob", Location::new(50, 100));
    tick_world(&world, Utc::now(), &mut rng);
    drain(&mut ra);

    bob.teleport(world.grid(), Location::new(70, 100));
    tick_world(&world, Utc::now(), &mut rng);
    let a = drain(&mut ra);
    let pa = positions(&a);
    assert_eq!(pa[0].players_leaving, vec![bob.index()]);
    assert!(pa[0].players_entering.is_empty());
    assert!(alice.known().players.is_empty());
}

#[test]
fn walking_player_is_reported_as_moved() {
    let world = World::new(10, Definitions::default());
    let mut rng = StdRng::seed_from_u64(2);
    let (_alice, mut ra) = join(&world, "alice", Location::new(200, 200));
    let (bob, mut rb) = join(&world, "bob", Location::new(205, 200));
    tick_world(&world, Utc::now(), &mut rng);
    drain(&mut ra);
    drain(&mut rb);

    bob.core().walk_to(Location::new(207, 200));
    tick_world(&world, Utc::now(), &mut rng);
    let a = drain(&mut ra);
    let pa = positions(&a);
    assert_eq!(pa[0].players_moved.len(), 1);
    assert_eq!(pa[0].players_moved[0].location, Location::new(206, 200));

    let b = drain(&mut rb);
    assert_eq!(
        positions(&b)[0].own.map(|o| o.location),
        Some(Location::new(206, 200))
    );
}

#[test]
fn npc_wanders_only_when_watched_and_stays_in_bounds() {
    let defs = Definitions::new(vec![npc_def(11, "Rat")], vec![], vec![], vec![]);
    let world = World::new(10, defs);
    let (min, max) = (Location::new(100, 100), Location::new(110, 110));
    let npc = world
        .spawn_npc(11, Location::new(105, 105), min, max)
        .expect("spawn");
    let mut rng = StdRng::seed_from_u64(3);
    let now = Utc::now();

    assert!(!npc.wander(world.grid(), now, &mut rng));
    assert!(npc.core().path().is_none());

    let watcher = Location::new(105 + WANDER_ACTIVATION_RADIUS, 105);
    let (_p, mut rx) = join(&world, "watcher", watcher);
    assert!(npc.wander(world.grid(), now, &mut rng));
    let dest = npc
        .core()
        .path()
        .and_then(|p| p.destination())
        .expect("wander path");
    assert!((min.x..=max.x).contains(&dest.x) && (min.y..=max.y).contains(&dest.y));
    assert!(npc.next_move() >= now + Duration::seconds(5));
    assert!(npc.next_move() <= now + Duration::seconds(15));

    // Cooling down.
    assert!(!npc.wander(world.grid(), now, &mut rng));

    let mut t = now;
    for _ in 0..200 {
        t += Duration::seconds(16);
        tick_world(&world, t, &mut rng);
        drain(&mut rx);
        let here = npc.location();
        assert!((min.x..=max.x).contains(&here.x), "{} left its box", here);
        assert!((min.y..=max.y).contains(&here.y), "{} left its box", here);
    }
}

#[test]
fn npc_on_cell_midpoint_notices_player_in_far_cell() {
    let defs = Definitions::new(vec![npc_def(11, "Rat")], vec![], vec![], vec![]);
    let world = World::new(10, defs);
    let (min, max) = (Location::new(115, 100), Location::new(125, 110));
    let npc = world
        .spawn_npc(11, Location::new(120, 105), min, max)
        .expect("spawn");
    let (_p, _rx) = join(&world, "watcher", Location::new(144, 105));

    let mut rng = StdRng::seed_from_u64(8);
    tick_world(&world, Utc::now(), &mut rng);
    assert!(npc.next_move() > Utc::now());
    let here = npc.location();
    assert!((min.x..=max.x).contains(&here.x) && (min.y..=max.y).contains(&here.y));
}

#[test]
fn walker_stops_short_of_a_solid_object() {
    let defs = Definitions::new(
        vec![],
        vec![object_def(1, "Tree", ["chop", "examine"], true)],
        vec![],
        vec![ObjectSpawn {
            id: 1,
            location: Location::new(102, 100),
            direction: 0,
            boundary: false,
        }],
    );
    let world = World::new(10, defs);
    world.populate();
    let mut rng = StdRng::seed_from_u64(4);
    let (p, mut rx) = join(&world, "walker", Location::new(100, 100));

    tick_world(&world, Utc::now(), &mut rng);
    let first = drain(&mut rx);
    assert!(first.iter().any(|m| matches!(m, ServerMsg::Objects(d)
        if d.entering.iter().any(|o| o.location == Location::new(102, 100)))));

    p.core().walk_to(Location::new(104, 100));
    for _ in 0..5 {
        tick_world(&world, Utc::now(), &mut rng);
    }
    assert_eq!(p.location(), Location::new(101, 100));
    assert!(p.core().path().is_none());
}

#[test]
fn concurrent_logins_and_logouts_leave_the_grid_clean() {
    let world = Arc::new(World::new(64, Definitions::default()));
    let spot = Location::new(300, 300);

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let world = Arc::clone(&world);
            std::thread::spawn(move || {
                for i in 0..50 {
                    let (session, _rx) = Session::new(4);
                    let name = format!("t{}p{}", t, i);
                    let p = world
                        .add_player(&name, spot, SkillTable::starting(), Appearance::default(), session)
                        .expect("room for everyone");
                    assert!(world.remove_player(p.index()).is_some());
                }
            })
        })
        .collect();
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..20 {
        tick_world(&world, Utc::now(), &mut rng);
    }
    for w in workers {
        w.join().expect("worker panicked");
    }

    assert_eq!(world.player_count(), 0);
    assert!(world.grid().cell_for(spot).players().is_empty());
}
