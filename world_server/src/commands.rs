//! In-game command registry.
//!
//! Commands arrive as a single line (`tele 120 650`); the first token picks
//! the handler and the rest are passed as arguments. Quoted arguments may
//! contain spaces.
//!
//! # Usage
//! ```ignore
//! let mut commands = CommandRegistry::new();
//! commands.register_command("home", |_args, ctx| {
//!     ctx.player.teleport(ctx.world.grid(), Location::SPAWN);
//!     Ok(())
//! });
//! let output = commands.exec(&world, &player, "home")?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use world_shared::{
    entity::MobileEntity,
    location::Location,
    net::ServerMsg,
    player::Player,
    world::World,
};

/// Command handler function type.
pub type CommandHandler =
    Box<dyn Fn(&[&str], &mut CommandContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Context passed to command handlers.
pub struct CommandContext<'a> {
    pub world: &'a World,
    /// Player that issued the command.
    pub player: &'a Arc<Player>,
    /// Lines to send back to the issuer.
    pub output: Vec<String>,
}

impl CommandContext<'_> {
    pub fn print(&mut self, msg: impl Into<String>) {
        self.output.push(msg.into());
    }

    /// Finds an online player by index or name.
    fn find_player(&self, args: &[&str]) -> anyhow::Result<Arc<Player>> {
        let name = args.join(" ");
        if let Ok(index) = name.parse::<usize>() {
            if let Some(p) = self.world.player(index) {
                return Ok(p);
            }
        }
        self.world
            .player_by_name(&name)
            .with_context(|| format!("Could not find player: '{}'", name))
    }
}

pub struct CommandRegistry {
    commands: HashMap<String, CommandHandler>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn coords(args: &[&str], usage: &str) -> anyhow::Result<Location> {
    let [x, y] = args else {
        bail!("Invalid args. Usage: {}", usage);
    };
    let (Ok(x), Ok(y)) = (x.parse::<i32>(), y.parse::<i32>()) else {
        bail!("Invalid args. Usage: {}", usage);
    };
    let l = Location::new(x, y);
    if !l.is_valid() {
        bail!("Coordinates out of world boundaries.");
    }
    Ok(l)
}

// tele <x> <y>
fn tele(args: &[&str], ctx: &mut CommandContext<'_>) -> anyhow::Result<()> {
    let to = coords(args, "tele <x> <y>")?;
    info!(player = %ctx.player.username(), from = %ctx.player.location(), %to, "Teleport");
    ctx.player.teleport(ctx.world.grid(), to);
    Ok(())
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
        };
        registry.register_builtin_commands();
        registry
    }

    fn register_builtin_commands(&mut self) {
        self.register_command("tele", tele);
        self.register_command("teleport", tele);

        self.register_command("where", |_args, ctx| {
            let l = ctx.player.location();
            ctx.print(format!("You are at {} on plane {}", l, l.plane()));
            Ok(())
        });

        // dobj <x> <y>
        self.register_command("dobj", |args, ctx| {
            let at = coords(args, "dobj <x> <y>")?;
            let Some(object) = ctx.world.object_at(at) else {
                bail!("Can not find object at coords {},{}", at.x, at.y);
            };
            ctx.world.remove_object(object.index);
            info!(player = %ctx.player.username(), id = object.id, %at, "Deleted object");
            Ok(())
        });

        // object <id> [dir]
        self.register_command("object", |args, ctx| {
            let Some(id) = args.first().and_then(|a| a.parse::<u32>().ok()) else {
                bail!("Invalid args. Usage: object <id> [dir]");
            };
            let direction = match args.get(1) {
                Some(d) => match d.parse::<u8>() {
                    Ok(d) if d < 8 => d,
                    _ => bail!("Invalid direction; must be between 0 and 7."),
                },
                None => 0,
            };
            let here = ctx.player.location();
            if ctx.world.object_at(here).is_some() {
                bail!("You must remove the old object at this location first!");
            }
            ctx.world.add_object(id, here, direction, false);
            info!(player = %ctx.player.username(), id, %here, "Spawned object");
            Ok(())
        });

        self.register_command("players", |_args, ctx| {
            let players = ctx.world.players();
            ctx.print(format!("Players online: {}", players.len()));
            for p in players {
                ctx.print(format!("  [{}] {} at {}", p.index(), p.username(), p.location()));
            }
            Ok(())
        });

        // kick <name|index>
        self.register_command("kick", |args, ctx| {
            if args.is_empty() {
                bail!("Invalid args. Usage: kick <player>");
            }
            let target = ctx.find_player(args)?;
            info!(player = %ctx.player.username(), target = %target.username(), "Kick");
            let _ = target.send(ServerMsg::Logout {
                reason: "kicked".to_string(),
            });
            target.disconnect();
            ctx.print(format!("Kicked: '{}'", target.username()));
            Ok(())
        });

        self.register_command("summon", |args, ctx| {
            if args.is_empty() {
                bail!("Invalid args. Usage: summon <player>");
            }
            let target = ctx.find_player(args)?;
            target.teleport(ctx.world.grid(), ctx.player.location());
            Ok(())
        });

        self.register_command("goto", |args, ctx| {
            if args.is_empty() {
                bail!("Invalid args. Usage: goto <player>");
            }
            let target = ctx.find_player(args)?;
            ctx.player.teleport(ctx.world.grid(), target.location());
            Ok(())
        });

        // say <msg>
        self.register_command("say", |args, ctx| {
            if args.is_empty() {
                bail!("Invalid args. Usage: say <msg>");
            }
            let text = format!("[GLOBAL] {}: {}", ctx.player.username(), args.join(" "));
            for p in ctx.world.players() {
                p.message(text.clone());
            }
            Ok(())
        });
    }

    /// Registers a command.
    pub fn register_command<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&[&str], &mut CommandContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.commands.insert(name.to_string(), Box::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Executes a command line on behalf of `player` and returns the lines to
    /// show them. Handler errors are reported to the player, not propagated.
    pub fn exec(&self, world: &World, player: &Arc<Player>, line: &str) -> Vec<String> {
        let tokens = parse_command_line(line.trim());
        let Some((name, rest)) = tokens.split_first() else {
            return Vec::new();
        };
        let name = name.to_ascii_lowercase();
        let args: Vec<&str> = rest.iter().map(|s| s.as_str()).collect();

        let mut ctx = CommandContext {
            world,
            player,
            output: Vec::new(),
        };
        match self.commands.get(name.as_str()) {
            Some(handler) => {
                info!(player = %player.username(), command = %line.trim(), "Command");
                if let Err(e) = handler(&args, &mut ctx) {
                    ctx.print(e.to_string());
                }
            }
            None => {
                info!(player = %player.username(), command = %line.trim(), "Invalid command");
                ctx.print("Invalid command.");
            }
        }
        ctx.output
    }
}

/// Parses a command line into tokens, respecting quotes.
pub fn parse_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => {
                current.push(c);
            }
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}
