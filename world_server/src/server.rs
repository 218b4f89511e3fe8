//! Server implementation.
//!
//! An authoritative world loop on a fixed game tick. Connections are served
//! by their own tasks (see [`crate::connection`]); the tick is the only
//! place movement happens and the only producer of view updates, so every
//! client sees one consistent ordering. Each tick:
//! - runs queued distanced actions,
//! - moves players, then lets NPCs wander and move,
//! - diffs every connected player's view and queues the result,
//! - clears the per-tick flags.
//!
//! Console commands: `status`, `players`, `kick <name>`, `quit`.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};
use world_shared::{
    config::WorldConfig,
    definitions::Definitions,
    entity::MobileEntity,
    movement::traverse_path,
    net::{ReliableListener, ServerMsg},
    view::sync_player,
    world::World,
};

use crate::{
    actions::ObjectActions,
    commands::{parse_command_line, CommandRegistry},
    connection,
    store::{MemoryStore, PlayerStore},
};

/// Everything a connection needs, shared by all of them.
pub struct ServerContext {
    pub cfg: WorldConfig,
    pub world: Arc<World>,
    pub store: Arc<dyn PlayerStore>,
    pub commands: CommandRegistry,
    pub actions: Arc<ObjectActions>,
}

/// Advances the world by one tick.
pub fn tick_world<R: Rng + ?Sized>(world: &World, now: DateTime<Utc>, rng: &mut R) {
    let players = world.players();
    let npcs = world.npcs();

    for p in &players {
        p.run_distanced_action(world);
    }
    for p in &players {
        traverse_path(p, world.grid(), world.collision());
    }
    for n in &npcs {
        n.wander(world.grid(), now, rng);
        traverse_path(n, world.grid(), world.collision());
    }
    for p in &players {
        for msg in sync_player(world, p) {
            if let Err(e) = p.send(msg) {
                warn!(player = %p.username(), error = %e, "Slow consumer; disconnecting");
                p.disconnect();
                break;
            }
        }
    }
    for p in &players {
        p.reset_tick_flags();
    }
    for n in &npcs {
        n.core().reset_sync_flags();
    }
}

/// Game server.
pub struct GameServer {
    ctx: Arc<ServerContext>,
    tcp: Option<ReliableListener>,
    local_addr: SocketAddr,
    acceptor: Option<JoinHandle<()>>,
    tick: u64,
    rng: StdRng,
    shutting_down: bool,
    /// Channel for console commands from stdin.
    console_rx: Option<mpsc::Receiver<String>>,
}

impl GameServer {
    /// Binds the listener and populates the world.
    pub async fn new(
        cfg: WorldConfig,
        definitions: Definitions,
        store: Arc<dyn PlayerStore>,
    ) -> anyhow::Result<Self> {
        cfg.validate()?;
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let tcp = ReliableListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;

        let world = Arc::new(World::new(cfg.max_players, definitions));
        world.populate();

        let ctx = Arc::new(ServerContext {
            cfg,
            world,
            store,
            commands: CommandRegistry::new(),
            actions: Arc::new(ObjectActions::new()),
        });
        Ok(Self {
            ctx,
            tcp: Some(tcp),
            local_addr,
            acceptor: None,
            tick: 0,
            rng: StdRng::from_entropy(),
            shutting_down: false,
            console_rx: None,
        })
    }

    /// Binds server sockets with an empty world and in-memory storage.
    pub async fn bind(cfg: WorldConfig) -> anyhow::Result<Self> {
        Self::new(cfg, Definitions::default(), Arc::new(MemoryStore::new())).await
    }

    /// Sets the console input receiver.
    pub fn set_console_input(&mut self, rx: mpsc::Receiver<String>) {
        self.console_rx = Some(rx);
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn world(&self) -> &Arc<World> {
        &self.ctx.world
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Seeds the tick's random source, for reproducible runs.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Starts accepting connections in the background. Calling it again
    /// does nothing.
    pub fn start(&mut self) {
        let Some(tcp) = self.tcp.take() else {
            return;
        };
        let ctx = Arc::clone(&self.ctx);
        self.acceptor = Some(tokio::spawn(async move {
            loop {
                match tcp.accept().await {
                    Ok((conn, peer)) => {
                        debug!(%peer, "Accepted connection");
                        tokio::spawn(connection::serve(conn, peer, Arc::clone(&ctx)));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }));
        info!(addr = %self.local_addr, "Accepting connections");
    }

    /// Runs the server for a number of ticks.
    pub async fn run_for_ticks(&mut self, ticks: u32) -> anyhow::Result<()> {
        let dt = Duration::from_millis(self.ctx.cfg.tick_ms);
        let mut next = Instant::now();

        for _ in 0..ticks {
            next += dt;
            self.step().await?;
            tokio::time::sleep_until(next).await;
        }
        Ok(())
    }

    /// Runs until `quit` is typed on the console.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.start();
        let dt = Duration::from_millis(self.ctx.cfg.tick_ms);
        let mut next = Instant::now();
        while !self.shutting_down {
            next += dt;
            self.step().await?;
            tokio::time::sleep_until(next).await;
        }
        self.shutdown();
        Ok(())
    }

    /// Executes one game tick.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        self.process_console_commands();
        tick_world(&self.ctx.world, Utc::now(), &mut self.rng);
        self.tick += 1;
        Ok(())
    }

    /// Logs everybody out and stops accepting.
    pub fn shutdown(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        for p in self.ctx.world.players() {
            let _ = p.send(ServerMsg::Logout {
                reason: "server shutting down".to_string(),
            });
            p.disconnect();
        }
        info!(tick = self.tick, "Server stopped");
    }

    fn process_console_commands(&mut self) {
        // Collect lines first to avoid borrow conflict
        let lines: Vec<String> = if let Some(ref mut rx) = self.console_rx {
            let mut collected = Vec::new();
            while let Ok(line) = rx.try_recv() {
                collected.push(line);
            }
            collected
        } else {
            Vec::new()
        };

        for line in lines {
            for out in self.exec_console(&line) {
                println!("{}", out);
            }
        }
    }

    /// Executes an operator console command.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens = parse_command_line(line.trim());
        let Some(cmd) = tokens.first() else {
            return Vec::new();
        };
        let world = &self.ctx.world;

        match cmd.as_str() {
            "status" => vec![
                format!("Tick: {}", self.tick),
                format!("Address: {}", self.local_addr),
                format!("{:?}", world),
                format!("Grid cells allocated: {}", world.grid().allocated()),
            ],
            "players" => {
                let mut out = vec![format!("Players: {}", world.player_count())];
                for p in world.players() {
                    out.push(format!("  [{}] {} at {}", p.index(), p.username(), p.location()));
                }
                out
            }
            "kick" => {
                let name = tokens[1..].join(" ");
                match world.player_by_name(&name) {
                    Some(p) => {
                        let _ = p.send(ServerMsg::Logout {
                            reason: "kicked".to_string(),
                        });
                        p.disconnect();
                        vec![format!("Kicked '{}'", p.username())]
                    }
                    None => vec![format!("No player named '{}'", name)],
                }
            }
            "quit" | "exit" => {
                info!("Server shutting down");
                self.shutting_down = true;
                Vec::new()
            }
            other => vec![format!("Unknown command: {}", other)],
        }
    }
}

/// Helper for tests: bind to an ephemeral port with the given tick length.
pub async fn bind_ephemeral(
    tick_ms: u64,
    definitions: Definitions,
) -> anyhow::Result<(GameServer, WorldConfig)> {
    let cfg = WorldConfig {
        server_addr: format!("{}:{}", IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        tick_ms,
        idle_timeout_ms: 5_000,
        ..Default::default()
    };
    let mut server =
        GameServer::new(cfg.clone(), definitions, Arc::new(MemoryStore::new())).await?;
    server.seed(0);
    let cfg = WorldConfig {
        server_addr: server.local_addr().to_string(),
        ..cfg
    };
    Ok((server, cfg))
}
