//! Configuration system.
//!
//! Loads world configuration from JSON strings/files (file IO left to app).

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Root configuration for a world server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Server listen address, e.g. `127.0.0.1:43594`.
    pub server_addr: String,
    /// Game tick length in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Concurrent player limit; also the size of the player index space.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Inbound intent queue capacity per connection.
    #[serde(default = "default_queue_capacity")]
    pub inbound_capacity: usize,
    /// Outbound message queue capacity per connection.
    #[serde(default = "default_queue_capacity")]
    pub outbound_capacity: usize,
    /// A connection that sends nothing for this long is dropped.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Where new characters appear.
    #[serde(default = "default_spawn")]
    pub spawn: Location,
    /// Definitions and spawn lists (JSON). Empty world when unset.
    #[serde(default)]
    pub definitions_path: Option<String>,
}

fn default_tick_ms() -> u64 {
    640
}

fn default_max_players() -> usize {
    1250
}

fn default_queue_capacity() -> usize {
    25
}

fn default_idle_timeout_ms() -> u64 {
    30_000
}

fn default_spawn() -> Location {
    Location::SPAWN
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:43594".to_string(),
            tick_ms: default_tick_ms(),
            max_players: default_max_players(),
            inbound_capacity: default_queue_capacity(),
            outbound_capacity: default_queue_capacity(),
            idle_timeout_ms: default_idle_timeout_ms(),
            spawn: default_spawn(),
            definitions_path: None,
        }
    }
}

impl WorldConfig {
    /// Parses config from JSON and checks it.
    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(s).context("parse world config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the server can not run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_ms == 0 {
            bail!("tick_ms must be positive");
        }
        if self.max_players == 0 {
            bail!("max_players must be positive");
        }
        if self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            bail!(
                "queue capacities must be positive (inbound {}, outbound {})",
                self.inbound_capacity,
                self.outbound_capacity
            );
        }
        if !self.spawn.is_valid() {
            bail!("spawn {} is outside the world", self.spawn);
        }
        Ok(())
    }
}
