//! Intent dispatch.
//!
//! Intents are validated here and turned into world mutations that the tick
//! then acts on: walking sets a path, object use queues a distanced action,
//! and so on. Invalid intents are logged and dropped without side effects.

use std::sync::Arc;

use tracing::{debug, info, warn};
use world_shared::{
    entity::{MobState, MobileEntity},
    location::Location,
    net::{ClientMsg, ServerMsg},
    pathway::Pathway,
    player::Player,
    view::PLAYER_VIEW_RADIUS,
};

use crate::{actions::INTERACTION_RANGE, server::ServerContext};

/// Most waypoints a single walk may carry.
pub const MAX_WAYPOINTS: usize = 25;
/// Waypoints must lie this close to the walker.
pub const MAX_WALK_DISTANCE: i32 = 64;
/// Longest chat line.
pub const MAX_CHAT_LEN: usize = 80;

pub fn dispatch(ctx: &ServerContext, player: &Arc<Player>, msg: ClientMsg) {
    match msg {
        ClientMsg::Login { .. } => {
            warn!(player = %player.username(), "Login sent twice; ignoring");
        }
        ClientMsg::WalkTo { waypoints } => walk(player, waypoints),
        ClientMsg::InteractObject { x, y, secondary } => interact(ctx, player, x, y, secondary),
        ClientMsg::Chat { text } => chat(ctx, player, &text),
        ClientMsg::Command { line } => {
            for out in ctx.commands.exec(&ctx.world, player, &line) {
                player.message(out);
            }
        }
        ClientMsg::ChangeAppearance(appearance) => {
            if !player.core().has_state(MobState::CHANGING_APPEARANCE) {
                warn!(player = %player.username(), "Appearance change without the design screen");
                return;
            }
            match appearance.validated() {
                Ok(appearance) => {
                    player.set_appearance(appearance);
                    player.core().remove_state(MobState::CHANGING_APPEARANCE);
                }
                Err(e) => warn!(player = %player.username(), error = %e, "Rejected appearance"),
            }
        }
        ClientMsg::SetFightMode { mode } => player.core().set_fight_mode(mode),
        ClientMsg::Ping => {
            if let Err(e) = player.send(ServerMsg::Pong) {
                warn!(error = %e, "Dropping slow client");
                player.disconnect();
            }
        }
        ClientMsg::Logout => {
            if player.core().is_fighting() {
                player.message("You can't logout during combat!");
                return;
            }
            let _ = player.send(ServerMsg::Logout {
                reason: "logout".to_string(),
            });
            player.disconnect();
        }
    }
}

fn walk(player: &Arc<Player>, waypoints: Vec<Location>) {
    let here = player.location();
    if waypoints.is_empty() || waypoints.len() > MAX_WAYPOINTS {
        warn!(player = %player.username(), count = waypoints.len(), "Bad waypoint count");
        return;
    }
    if let Some(bad) = waypoints
        .iter()
        .find(|w| !w.is_valid() || !w.within_range(&here, MAX_WALK_DISTANCE))
    {
        warn!(player = %player.username(), %here, waypoint = %bad, "Walk target out of range");
        return;
    }
    if player.core().busy() {
        debug!(player = %player.username(), state = ?player.core().state(), "Busy; ignoring walk");
        return;
    }
    player.clear_distanced_action();
    player.core().set_path(Pathway::new(waypoints));
}

fn interact(ctx: &ServerContext, player: &Arc<Player>, x: i32, y: i32, secondary: bool) {
    let Some(object) = ctx.world.object_at(Location::new(x, y)) else {
        info!(player = %player.username(), x, y, "Object not found");
        return;
    };
    if player.core().busy() {
        return;
    }
    let here = player.location();
    if !object.location.within_range(&here, MAX_WALK_DISTANCE) {
        warn!(player = %player.username(), %here, at = %object.location, "Object out of reach");
        return;
    }
    if !here.within_range(&object.location, INTERACTION_RANGE) {
        player.core().walk_to(object.location);
    }
    let actions = Arc::clone(&ctx.actions);
    player.set_distanced_action(Box::new(move |world, p| {
        if p.location().within_range(&object.location, INTERACTION_RANGE) {
            actions.run(world, p, &object, secondary);
            return true;
        }
        // Stopped short of the object: give up.
        p.core().finished_path()
    }));
}

fn chat(ctx: &ServerContext, player: &Arc<Player>, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if text.len() > MAX_CHAT_LEN {
        warn!(player = %player.username(), len = text.len(), "Chat line too long");
        return;
    }
    let msg = ServerMsg::Chat {
        index: player.index(),
        username: player.username().to_string(),
        text: text.to_string(),
    };
    for listener in ctx.world.players_near(player.location(), PLAYER_VIEW_RADIUS) {
        if let Err(e) = listener.send(msg.clone()) {
            warn!(error = %e, "Dropping slow client");
            listener.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{actions::ObjectActions, commands::CommandRegistry, store::MemoryStore};
    use chrono::Utc;
    use rand::{rngs::StdRng, SeedableRng};
    use tokio::sync::mpsc;
    use world_shared::{
        appearance::{Appearance, BEARD_HEAD, FEMALE_BODY, METAL_HEAD},
        config::WorldConfig,
        definitions::{Definitions, ObjectDef},
        player::Session,
        skills::SkillTable,
        world::World,
    };

    use crate::server::tick_world;

    fn context() -> ServerContext {
        let defs = Definitions::new(
            Vec::new(),
            vec![ObjectDef {
                id: 5,
                name: "Ladder".into(),
                commands: ["climb-up".into(), String::new()],
                solid: false,
            }],
            Vec::new(),
            Vec::new(),
        );
        ServerContext {
            cfg: WorldConfig::default(),
            world: Arc::new(World::new(8, defs)),
            store: Arc::new(MemoryStore::new()),
            commands: CommandRegistry::new(),
            actions: Arc::new(ObjectActions::new()),
        }
    }

    fn join(ctx: &ServerContext, name: &str, at: Location) -> (Arc<Player>, mpsc::Receiver<ServerMsg>) {
        let (session, rx) = Session::new(32);
        let p = ctx
            .world
            .add_player(name, at, SkillTable::starting(), Appearance::default(), session)
            .unwrap();
        (p, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn walk_validates_waypoints() {
        let ctx = context();
        let (p, _rx) = join(&ctx, "alice", Location::new(100, 100));

        dispatch(&ctx, &p, ClientMsg::WalkTo { waypoints: vec![] });
        assert!(p.core().path().is_none());
        dispatch(&ctx, &p, ClientMsg::WalkTo { waypoints: vec![Location::new(300, 100)] });
        assert!(p.core().path().is_none());
        dispatch(&ctx, &p, ClientMsg::WalkTo { waypoints: vec![Location::new(-1, 100)] });
        assert!(p.core().path().is_none());

        dispatch(&ctx, &p, ClientMsg::WalkTo { waypoints: vec![Location::new(105, 100)] });
        assert_eq!(p.core().path().unwrap().destination(), Some(Location::new(105, 100)));
    }

    #[test]
    fn chat_reaches_nearby_players_only() {
        let ctx = context();
        let (a, mut ra) = join(&ctx, "alice", Location::new(100, 100));
        let (_b, mut rb) = join(&ctx, "bob", Location::new(105, 100));
        let (_c, mut rc) = join(&ctx, "carol", Location::new(140, 100));

        dispatch(&ctx, &a, ClientMsg::Chat { text: " hi there ".into() });
        let expected = ServerMsg::Chat {
            index: a.index(),
            username: "alice".into(),
            text: "hi there".into(),
        };
        assert_eq!(drain(&mut ra), vec![expected.clone()]);
        assert_eq!(drain(&mut rb), vec![expected]);
        assert!(drain(&mut rc).is_empty());
    }

    #[test]
    fn appearance_needs_design_state() {
        let ctx = context();
        let (p, _rx) = join(&ctx, "alice", Location::new(100, 100));
        p.reset_tick_flags();
        let wanted = Appearance {
            male: false,
            head: BEARD_HEAD,
            ..Appearance::default()
        };

        dispatch(&ctx, &p, ClientMsg::ChangeAppearance(wanted));
        assert_eq!(p.appearance(), Appearance::default());

        p.core().add_state(MobState::CHANGING_APPEARANCE);
        dispatch(&ctx, &p, ClientMsg::ChangeAppearance(wanted));
        assert_eq!(p.appearance().head, METAL_HEAD);
        assert_eq!(p.appearance().body, FEMALE_BODY);
        assert!(p.appearance_changed());
        assert!(!p.core().busy());
    }

    #[test]
    fn object_use_waits_until_adjacent() {
        let ctx = context();
        let (p, _rx) = join(&ctx, "alice", Location::new(100, 100));
        ctx.world.add_object(5, Location::new(100, 104), 0, false).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        dispatch(&ctx, &p, ClientMsg::InteractObject { x: 100, y: 104, secondary: false });
        assert!(p.has_distanced_action());

        for _ in 0..6 {
            tick_world(&ctx.world, Utc::now(), &mut rng);
            if !p.has_distanced_action() {
                break;
            }
        }
        assert!(!p.has_distanced_action());
        // Climbed the ladder from the tile next to it.
        assert_eq!(p.location().plane(), 1);
    }

    #[test]
    fn unknown_object_is_ignored() {
        let ctx = context();
        let (p, _rx) = join(&ctx, "alice", Location::new(100, 100));
        dispatch(&ctx, &p, ClientMsg::InteractObject { x: 101, y: 101, secondary: false });
        assert!(!p.has_distanced_action());
    }

    #[test]
    fn ping_and_logout() {
        let ctx = context();
        let (p, mut rx) = join(&ctx, "alice", Location::new(100, 100));
        dispatch(&ctx, &p, ClientMsg::Ping);
        dispatch(&ctx, &p, ClientMsg::Logout);
        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMsg::Pong,
                ServerMsg::Logout {
                    reason: "logout".into()
                }
            ]
        );
        assert!(p.kill_signal().is_closed());
    }

    #[test]
    fn commands_answer_with_messages() {
        let ctx = context();
        let (p, mut rx) = join(&ctx, "alice", Location::new(100, 100));
        dispatch(&ctx, &p, ClientMsg::Command { line: "where".into() });
        assert_eq!(
            drain(&mut rx),
            vec![ServerMsg::Message {
                text: "You are at (100, 100) on plane 0".into()
            }]
        );
    }
}
