//! Static content: NPC and object definitions plus spawn lists.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::location::Location;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NpcDef {
    pub id: u32,
    pub name: String,
    /// Right-click option, e.g. "pickpocket". Empty when there is none.
    #[serde(default)]
    pub command: String,
    pub hits: i32,
    pub attack: i32,
    pub strength: i32,
    pub defense: i32,
    #[serde(default)]
    pub attackable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectDef {
    pub id: u32,
    pub name: String,
    /// Primary and secondary commands, lower case.
    #[serde(default)]
    pub commands: [String; 2],
    #[serde(default)]
    pub solid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NpcSpawn {
    pub id: u32,
    pub start: Location,
    pub min: Location,
    pub max: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectSpawn {
    pub id: u32,
    pub location: Location,
    #[serde(default)]
    pub direction: u8,
    #[serde(default)]
    pub boundary: bool,
}

/// Everything the world is populated from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default)]
    npcs: Vec<NpcDef>,
    #[serde(default)]
    objects: Vec<ObjectDef>,
    #[serde(default)]
    pub npc_spawns: Vec<NpcSpawn>,
    #[serde(default)]
    pub object_spawns: Vec<ObjectSpawn>,
    #[serde(skip)]
    npc_lookup: HashMap<u32, usize>,
    #[serde(skip)]
    object_lookup: HashMap<u32, usize>,
}

impl Definitions {
    pub fn new(
        npcs: Vec<NpcDef>,
        objects: Vec<ObjectDef>,
        npc_spawns: Vec<NpcSpawn>,
        object_spawns: Vec<ObjectSpawn>,
    ) -> Self {
        let mut defs = Self {
            npcs,
            objects,
            npc_spawns,
            object_spawns,
            npc_lookup: HashMap::new(),
            object_lookup: HashMap::new(),
        };
        defs.index();
        defs
    }

    pub fn from_json_str(s: &str) -> anyhow::Result<Self> {
        let mut defs: Self = serde_json::from_str(s).context("parse definitions")?;
        defs.index();
        Ok(defs)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read definitions from {}", path.display()))?;
        Self::from_json_str(&text)
    }

    fn index(&mut self) {
        self.npc_lookup = self.npcs.iter().enumerate().map(|(i, d)| (d.id, i)).collect();
        self.object_lookup = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();
    }

    pub fn npc(&self, id: u32) -> Option<&NpcDef> {
        self.npc_lookup.get(&id).map(|&i| &self.npcs[i])
    }

    pub fn object(&self, id: u32) -> Option<&ObjectDef> {
        self.object_lookup.get(&id).map(|&i| &self.objects[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "npcs": [
            { "id": 11, "name": "Man", "command": "pickpocket",
              "hits": 7, "attack": 5, "strength": 5, "defense": 4, "attackable": true }
        ],
        "objects": [
            { "id": 5, "name": "Ladder", "commands": ["climb-up", ""] },
            { "id": 1, "name": "Tree", "commands": ["chop", "examine"], "solid": true }
        ],
        "npc_spawns": [
            { "id": 11, "start": { "x": 105, "y": 105 },
              "min": { "x": 100, "y": 100 }, "max": { "x": 110, "y": 110 } }
        ],
        "object_spawns": [
            { "id": 5, "location": { "x": 120, "y": 120 } }
        ]
    }"#;

    #[test]
    fn parses_and_indexes() {
        let defs = Definitions::from_json_str(SAMPLE).unwrap();
        assert_eq!(defs.npc(11).map(|d| d.name.as_str()), Some("Man"));
        assert_eq!(defs.object(5).map(|d| d.commands[0].as_str()), Some("climb-up"));
        assert!(defs.object(1).is_some_and(|d| d.solid));
        assert!(defs.npc(99).is_none());
        assert_eq!(defs.npc_spawns.len(), 1);
        assert!(!defs.object_spawns[0].boundary);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Definitions::from_json_str("{ \"npcs\": 3 }").is_err());
    }
}
