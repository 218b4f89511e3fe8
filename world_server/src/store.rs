//! Durable player state.
//!
//! The world only needs a player's location, skills, appearance and fight
//! mode to survive between sessions. Storage sits behind [`PlayerStore`];
//! [`MemoryStore`] keeps everything in process.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use world_shared::{
    appearance::Appearance, combat::FightMode, entity::MobileEntity, location::Location, lock,
    player::Player, skills::SkillSnapshot, skills::SkillTable,
};

/// What is kept for a character between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub location: Location,
    pub skills: SkillSnapshot,
    pub appearance: Appearance,
    pub fight_mode: FightMode,
    /// Set until the character has picked an appearance.
    #[serde(default)]
    pub needs_design: bool,
}

impl PlayerRecord {
    /// A brand-new character standing at `spawn`.
    pub fn new_character(spawn: Location) -> Self {
        Self {
            location: spawn,
            skills: SkillTable::starting().snapshot(),
            appearance: Appearance::default(),
            fight_mode: FightMode::default(),
            needs_design: true,
        }
    }

    pub fn capture(player: &Player) -> Self {
        Self {
            location: player.location(),
            skills: player.skills().snapshot(),
            appearance: player.appearance(),
            fight_mode: player.core().fight_mode(),
            needs_design: false,
        }
    }
}

#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Loads a character. `None` means the name has never been saved.
    async fn load(&self, username: &str) -> anyhow::Result<Option<PlayerRecord>>;

    async fn save(&self, username: &str, record: &PlayerRecord) -> anyhow::Result<()>;
}

/// In-process store keyed by lower-cased username.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, PlayerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock::lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn load(&self, username: &str) -> anyhow::Result<Option<PlayerRecord>> {
        Ok(lock::lock(&self.records)
            .get(&username.to_ascii_lowercase())
            .cloned())
    }

    async fn save(&self, username: &str, record: &PlayerRecord) -> anyhow::Result<()> {
        lock::lock(&self.records).insert(username.to_ascii_lowercase(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip_ignores_case() {
        let store = MemoryStore::new();
        assert!(store.load("Alice").await.unwrap().is_none());

        let mut record = PlayerRecord::new_character(Location::new(120, 650));
        record.needs_design = false;
        store.save("Alice", &record).await.unwrap();

        let back = store.load("alice").await.unwrap().expect("saved");
        assert_eq!(back, record);
        assert_eq!(store.len(), 1);
    }
}
