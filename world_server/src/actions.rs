//! Object interactions.
//!
//! Using an object looks for a handler registered for its definition id
//! first, then for the command text the definition gives that option. With
//! neither, the player is told nothing happens.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use world_shared::{
    entity::MobileEntity, object::GameObject, player::Player, skills::PRAYER, world::World,
};

pub const DEFAULT_ACTION_MESSAGE: &str = "Nothing interesting happens.";

/// How close a player must stand to use an object.
pub const INTERACTION_RANGE: i32 = 1;

pub type ActionHandler = Box<dyn Fn(&World, &Arc<Player>, &GameObject) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ActionKey {
    Id(u32),
    Command(String),
}

/// Scenery doors: open <-> closed.
const DOORS: [(u32, u32); 3] = [(59, 60), (57, 58), (63, 64)];
/// Boundary doors: open <-> closed.
const BOUNDARY_DOORS: [(u32, u32); 1] = [(2, 1)];
const ALTAR: u32 = 19;

fn toggled(table: &[(u32, u32)], id: u32) -> Option<u32> {
    table.iter().find_map(|&(a, b)| {
        if a == id {
            Some(b)
        } else if b == id {
            Some(a)
        } else {
            None
        }
    })
}

fn toggle_door(world: &World, _player: &Arc<Player>, object: &GameObject) {
    let table: &[(u32, u32)] = if object.boundary { &BOUNDARY_DOORS } else { &DOORS };
    if let Some(id) = toggled(table, object.id) {
        world.replace_object(object, id);
    }
}

#[derive(Default)]
pub struct ObjectActions {
    primary: HashMap<ActionKey, ActionHandler>,
    secondary: HashMap<ActionKey, ActionHandler>,
}

impl ObjectActions {
    /// A registry with no handlers at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stairs, ladders, doors and the altar.
    pub fn new() -> Self {
        let mut actions = Self::empty();
        actions.register_id(false, ALTAR, |_world, player, _object| {
            if player.skills().restore(PRAYER) {
                player.message("You recharge your prayer points at the altar.");
            }
        });
        actions.register_command(false, "climb-up", |world, player, _object| {
            let up = player.location().above();
            if up != player.location() {
                player.teleport(world.grid(), up);
            }
        });
        actions.register_command(false, "go up", |world, player, _object| {
            let up = player.location().above();
            if up != player.location() {
                player.teleport(world.grid(), up);
            }
        });
        actions.register_command(false, "climb-down", |world, player, _object| {
            let down = player.location().below();
            if down != player.location() {
                player.teleport(world.grid(), down);
            }
        });
        actions.register_command(false, "go down", |world, player, _object| {
            let down = player.location().below();
            if down != player.location() {
                player.teleport(world.grid(), down);
            }
        });
        actions.register_command(false, "open", toggle_door);
        actions.register_command(true, "close", toggle_door);
        actions
    }

    pub fn register_id<F>(&mut self, secondary: bool, id: u32, handler: F)
    where
        F: Fn(&World, &Arc<Player>, &GameObject) + Send + Sync + 'static,
    {
        self.table(secondary).insert(ActionKey::Id(id), Box::new(handler));
    }

    pub fn register_command<F>(&mut self, secondary: bool, command: &str, handler: F)
    where
        F: Fn(&World, &Arc<Player>, &GameObject) + Send + Sync + 'static,
    {
        self.table(secondary)
            .insert(ActionKey::Command(command.to_ascii_lowercase()), Box::new(handler));
    }

    fn table(&mut self, secondary: bool) -> &mut HashMap<ActionKey, ActionHandler> {
        if secondary {
            &mut self.secondary
        } else {
            &mut self.primary
        }
    }

    /// Performs the action if the player is still idle, in range, and the
    /// object has not been replaced meanwhile.
    pub fn run(&self, world: &World, player: &Arc<Player>, object: &GameObject, secondary: bool) {
        if player.core().busy() {
            debug!(player = %player.username(), "Busy; skipping object action");
            return;
        }
        if world.object(object.index).as_deref() != Some(object) {
            debug!(player = %player.username(), index = object.index, "Object changed before arrival");
            return;
        }
        if !player.location().within_range(&object.location, INTERACTION_RANGE) {
            warn!(player = %player.username(), at = %object.location, "Object action fired out of range");
            return;
        }
        let table = if secondary { &self.secondary } else { &self.primary };
        if let Some(handler) = table.get(&ActionKey::Id(object.id)) {
            handler(world, player, object);
            return;
        }
        let command = world
            .definitions()
            .object(object.id)
            .map(|d| d.commands[usize::from(secondary)].to_ascii_lowercase())
            .unwrap_or_default();
        if let Some(handler) = table.get(&ActionKey::Command(command)) {
            handler(world, player, object);
            return;
        }
        player.message(DEFAULT_ACTION_MESSAGE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use world_shared::{
        appearance::Appearance,
        definitions::{Definitions, ObjectDef},
        location::Location,
        net::ServerMsg,
        player::Session,
        skills::SkillTable,
    };

    fn object_def(id: u32, name: &str, primary: &str, secondary: &str) -> ObjectDef {
        ObjectDef {
            id,
            name: name.into(),
            commands: [primary.into(), secondary.into()],
            solid: false,
        }
    }

    fn setup() -> (World, Arc<Player>, mpsc::Receiver<ServerMsg>) {
        let defs = Definitions::new(
            Vec::new(),
            vec![
                object_def(5, "Ladder", "climb-up", ""),
                object_def(6, "Ladder", "climb-down", ""),
                object_def(59, "Door", "open", ""),
                object_def(60, "Door", "", "close"),
                object_def(30, "Rock", "mine", "prospect"),
            ],
            Vec::new(),
            Vec::new(),
        );
        let world = World::new(4, defs);
        let (session, rx) = Session::new(8);
        let p = world
            .add_player(
                "alice",
                Location::new(100, 100),
                SkillTable::starting(),
                Appearance::default(),
                session,
            )
            .unwrap();
        (world, p, rx)
    }

    #[test]
    fn ladder_climbs_a_plane() {
        let (world, p, _rx) = setup();
        let ladder = world.add_object(5, Location::new(101, 100), 0, false).unwrap();
        ObjectActions::new().run(&world, &p, &ladder, false);
        assert_eq!(p.location(), Location::new(100, 1044));
        assert!(p.core().was_removed());
    }

    #[test]
    fn unhandled_object_gets_default_message() {
        let (world, p, mut rx) = setup();
        let rock = world.add_object(30, Location::new(100, 101), 0, false).unwrap();
        ObjectActions::new().run(&world, &p, &rock, true);
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerMsg::Message {
                text: DEFAULT_ACTION_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn id_handler_wins_over_command() {
        let (world, p, mut rx) = setup();
        let mut actions = ObjectActions::new();
        actions.register_id(false, 5, |_w, player, _o| player.message("special ladder"));
        let ladder = world.add_object(5, Location::new(101, 100), 0, false).unwrap();
        actions.run(&world, &p, &ladder, false);
        assert_eq!(p.location(), Location::new(100, 100));
        assert!(matches!(rx.try_recv().unwrap(), ServerMsg::Message { text } if text == "special ladder"));
    }

    #[test]
    fn doors_toggle_and_far_objects_are_ignored() {
        let (world, p, _rx) = setup();
        let door = world.add_object(59, Location::new(100, 99), 0, false).unwrap();
        let actions = ObjectActions::new();
        actions.run(&world, &p, &door, false);
        let now = world.object_at(Location::new(100, 99)).unwrap();
        assert_eq!(now.id, 60);

        // Stale handle: the door it points at is gone.
        actions.run(&world, &p, &door, false);
        assert_eq!(world.object_at(Location::new(100, 99)).unwrap().id, 60);

        let far = world.add_object(5, Location::new(110, 110), 0, false).unwrap();
        actions.run(&world, &p, &far, false);
        assert_eq!(p.location(), Location::new(100, 100));
    }
}
