//! Per-mob transient properties.
//!
//! A `PropertyBag` is a small, concurrency-safe key/value store for state that
//! only one feature cares about (fight target, cooldowns, sync flags). Every
//! read and write takes the bag's readers-writer lock once, so a caller never
//! observes a half-written value.
//!
//! Keys used by the core engine live in [`keys`]; feature modules own any
//! other key they introduce.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::{entity::MobRef, lock, pathway::Pathway};

/// Property keys owned by the core engine.
pub mod keys {
    /// `Int` bitmask of [`crate::entity::MobState`].
    pub const STATE: &str = "state";
    /// `Int` facing [`crate::location::Direction`].
    pub const DIRECTION: &str = "direction";
    /// `Path` currently being walked.
    pub const PATH: &str = "path";
    /// `Bool` sync flag: stepped this tick.
    pub const MOVED: &str = "moved";
    /// `Bool` sync flag: turned or otherwise changed sprite this tick.
    pub const CHANGED: &str = "changed";
    /// `Bool` sync flag: teleported this tick; observers drop and re-add.
    pub const REMOVED: &str = "removed";
    /// `Mob` currently being fought.
    pub const FIGHT_TARGET: &str = "fight_target";
    /// `Int` melee rounds exchanged with the current target.
    pub const FIGHT_ROUND: &str = "fight_round";
    /// `Int` selected [`crate::combat::FightMode`].
    pub const FIGHT_MODE: &str = "fight_mode";
    /// `Time` the last fight ended.
    pub const LAST_FIGHT: &str = "last_fight";
    /// `Time` of the last retreat.
    pub const LAST_RETREAT: &str = "last_retreat";
    /// `Time` an NPC may next pick a wander destination.
    pub const NEXT_MOVE: &str = "next_move";
    /// `Int` equipment bonuses.
    pub const AIM_POINTS: &str = "aim_points";
    pub const POWER_POINTS: &str = "power_points";
    pub const ARMOUR_POINTS: &str = "armour_points";
}

/// A value stored in a [`PropertyBag`].
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
    Path(Pathway),
    Mob(MobRef),
}

/// Concurrency-safe dynamically keyed property store.
#[derive(Debug, Default)]
pub struct PropertyBag {
    set: RwLock<HashMap<String, PropValue>>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing whatever was there.
    pub fn set_var(&self, name: &str, value: PropValue) {
        lock::write(&self.set).insert(name.to_string(), value);
    }

    pub fn unset_var(&self, name: &str) {
        lock::write(&self.set).remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        lock::read(&self.set).contains_key(name)
    }

    pub fn var(&self, name: &str) -> Option<PropValue> {
        lock::read(&self.set).get(name).cloned()
    }

    pub fn var_int(&self, name: &str, zero: i64) -> i64 {
        match lock::read(&self.set).get(name) {
            Some(PropValue::Int(v)) => *v,
            _ => zero,
        }
    }

    pub fn var_bool(&self, name: &str, zero: bool) -> bool {
        match lock::read(&self.set).get(name) {
            Some(PropValue::Bool(v)) => *v,
            _ => zero,
        }
    }

    pub fn var_time(&self, name: &str, zero: DateTime<Utc>) -> DateTime<Utc> {
        match lock::read(&self.set).get(name) {
            Some(PropValue::Time(v)) => *v,
            _ => zero,
        }
    }

    pub fn var_path(&self, name: &str) -> Option<Pathway> {
        match lock::read(&self.set).get(name) {
            Some(PropValue::Path(p)) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn var_mob(&self, name: &str) -> Option<MobRef> {
        match lock::read(&self.set).get(name) {
            Some(PropValue::Mob(m)) => Some(*m),
            _ => None,
        }
    }

    /// Sets the bits of `mask` on the integer stored at `name`. A missing or
    /// non-integer value is treated as zero.
    pub fn mask_int(&self, name: &str, mask: i64) {
        let mut set = lock::write(&self.set);
        let current = match set.get(name) {
            Some(PropValue::Int(v)) => *v,
            _ => 0,
        };
        set.insert(name.to_string(), PropValue::Int(current | mask));
    }

    /// Clears the bits of `mask` on the integer stored at `name`.
    pub fn unmask_int(&self, name: &str, mask: i64) {
        let mut set = lock::write(&self.set);
        let current = match set.get(name) {
            Some(PropValue::Int(v)) => *v,
            _ => 0,
        };
        set.insert(name.to_string(), PropValue::Int(current & !mask));
    }

    /// True when any bit of `mask` is set on the integer at `name`.
    pub fn check_mask(&self, name: &str, mask: i64) -> bool {
        self.var_int(name, 0) & mask != 0
    }

    /// Calls `f` for every entry while holding the read lock.
    pub fn range(&self, mut f: impl FnMut(&str, &PropValue)) {
        for (k, v) in lock::read(&self.set).iter() {
            f(k, v);
        }
    }

    pub fn len(&self) -> usize {
        lock::read(&self.set).len()
    }

    pub fn is_empty(&self) -> bool {
        lock::read(&self.set).is_empty()
    }
}
