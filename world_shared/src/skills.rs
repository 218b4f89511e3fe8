//! Skill table.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::lock;

/// Number of skill slots.
pub const SKILL_COUNT: usize = 18;

pub const ATTACK: usize = 0;
pub const DEFENSE: usize = 1;
pub const STRENGTH: usize = 2;
pub const HITS: usize = 3;
pub const RANGED: usize = 4;
pub const PRAYER: usize = 5;
pub const MAGIC: usize = 6;
pub const COOKING: usize = 7;
pub const WOODCUTTING: usize = 8;
pub const FLETCHING: usize = 9;
pub const FISHING: usize = 10;
pub const FIREMAKING: usize = 11;
pub const CRAFTING: usize = 12;
pub const SMITHING: usize = 13;
pub const MINING: usize = 14;
pub const HERBLAW: usize = 15;
pub const AGILITY: usize = 16;
pub const THIEVING: usize = 17;

/// Plain copy of a skill table, used for persistence and stat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SkillSnapshot {
    pub current: [i32; SKILL_COUNT],
    pub maximum: [i32; SKILL_COUNT],
    pub experience: [i32; SKILL_COUNT],
}

/// Current level, maximum level and experience for every skill.
///
/// Current levels may sit above or below the maximum (potions, drains);
/// the maximum is what combat level and restores are based on.
#[derive(Debug, Default)]
pub struct SkillTable {
    inner: RwLock<SkillSnapshot>,
}

impl SkillTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: SkillSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Fresh character: 10 hits with the matching experience, 1 elsewhere.
    pub fn starting() -> Self {
        let mut s = SkillSnapshot::default();
        for i in 0..SKILL_COUNT {
            s.current[i] = 1;
            s.maximum[i] = 1;
        }
        s.current[HITS] = 10;
        s.maximum[HITS] = 10;
        s.experience[HITS] = 1154;
        Self::from_snapshot(s)
    }

    pub fn snapshot(&self) -> SkillSnapshot {
        *lock::read(&self.inner)
    }

    pub fn current(&self, idx: usize) -> i32 {
        lock::read(&self.inner).current[idx]
    }

    pub fn maximum(&self, idx: usize) -> i32 {
        lock::read(&self.inner).maximum[idx]
    }

    pub fn experience(&self, idx: usize) -> i32 {
        lock::read(&self.inner).experience[idx]
    }

    pub fn set_current(&self, idx: usize, val: i32) {
        lock::write(&self.inner).current[idx] = val;
    }

    pub fn increase_current(&self, idx: usize, delta: i32) {
        lock::write(&self.inner).current[idx] += delta;
    }

    pub fn decrease_current(&self, idx: usize, delta: i32) {
        lock::write(&self.inner).current[idx] -= delta;
    }

    pub fn set_maximum(&self, idx: usize, val: i32) {
        lock::write(&self.inner).maximum[idx] = val;
    }

    pub fn increase_maximum(&self, idx: usize, delta: i32) {
        lock::write(&self.inner).maximum[idx] += delta;
    }

    pub fn decrease_maximum(&self, idx: usize, delta: i32) {
        lock::write(&self.inner).maximum[idx] -= delta;
    }

    pub fn set_experience(&self, idx: usize, val: i32) {
        lock::write(&self.inner).experience[idx] = val;
    }

    pub fn add_experience(&self, idx: usize, delta: i32) {
        lock::write(&self.inner).experience[idx] += delta;
    }

    /// Sets both current and maximum to `level`.
    pub fn set_level(&self, idx: usize, level: i32) {
        let mut s = lock::write(&self.inner);
        s.current[idx] = level;
        s.maximum[idx] = level;
    }

    /// Brings the current level back to the maximum. Returns true when the
    /// level actually changed.
    pub fn restore(&self, idx: usize) -> bool {
        let mut s = lock::write(&self.inner);
        if s.current[idx] == s.maximum[idx] {
            return false;
        }
        s.current[idx] = s.maximum[idx];
        true
    }

    /// Combat level derived from maximum levels.
    pub fn combat_level(&self) -> i32 {
        let s = lock::read(&self.inner);
        let aggressive = (s.maximum[ATTACK] + s.maximum[STRENGTH]) as f32;
        let defensive = (s.maximum[DEFENSE] + s.maximum[HITS]) as f32;
        let spiritual = ((s.maximum[PRAYER] + s.maximum[MAGIC]) / 8) as f32;
        let ranged = s.maximum[RANGED] as f32;
        if aggressive < ranged * 1.5 {
            return (defensive / 4.0 + ranged * 0.375 + spiritual) as i32;
        }
        (aggressive / 4.0 + defensive / 4.0 + spiritual) as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_character_is_level_three() {
        let skills = SkillTable::starting();
        assert_eq!(skills.current(HITS), 10);
        assert_eq!(skills.experience(HITS), 1154);
        // (1+1)/4 + (1+10)/4 + (1+1)/8 = 0.5 + 2.75 + 0
        assert_eq!(skills.combat_level(), 3);
    }

    #[test]
    fn ranged_formula_applies_when_ranged_dominates() {
        let skills = SkillTable::new();
        skills.set_level(ATTACK, 1);
        skills.set_level(STRENGTH, 1);
        skills.set_level(DEFENSE, 40);
        skills.set_level(HITS, 40);
        skills.set_level(RANGED, 60);
        skills.set_level(PRAYER, 8);
        skills.set_level(MAGIC, 8);
        // 80/4 + 60*0.375 + 16/8 = 20 + 22.5 + 2
        assert_eq!(skills.combat_level(), 44);
    }

    #[test]
    fn current_is_not_clamped_and_restore_uses_maximum() {
        let skills = SkillTable::starting();
        skills.increase_current(STRENGTH, 5);
        assert_eq!(skills.current(STRENGTH), 6);
        assert_eq!(skills.maximum(STRENGTH), 1);
        assert!(skills.restore(STRENGTH));
        assert_eq!(skills.current(STRENGTH), 1);
        assert!(!skills.restore(STRENGTH));
    }
}
