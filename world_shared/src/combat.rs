//! Melee combat arithmetic.
//!
//! Accuracy and defense are scaled stat products; a hit lands when a uniform
//! roll out of 10000 falls under the hit chance derived from the two, and the
//! damage is then uniform in `0..=max_hit`. The constants here are what
//! existing clients and content were balanced against, so they are kept
//! exactly.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    entity::{MobCore, MobKind, MobileEntity},
    skills::{ATTACK, DEFENSE, STRENGTH},
};

/// Accuracy/defense multiplier applied to NPCs.
pub const NPC_MULTIPLIER: f32 = 0.9;

/// Prayer bonuses are not modelled yet; every stat uses the neutral value.
const PRAYER_MULTIPLIER: f32 = 1.0;

/// Melee training style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FightMode {
    /// Trains everything; +1 to every stat.
    #[default]
    Controlled = 0,
    /// +3 strength.
    Aggressive = 1,
    /// +3 attack.
    Accurate = 2,
    /// +3 defense.
    Defensive = 3,
}

impl FightMode {
    pub fn from_i64(v: i64) -> Self {
        match v {
            1 => FightMode::Aggressive,
            2 => FightMode::Accurate,
            3 => FightMode::Defensive,
            _ => FightMode::Controlled,
        }
    }
}

/// Bonus the current fight mode grants to `stat`.
pub fn style_bonus(mode: FightMode, stat: usize) -> i32 {
    match (mode, stat) {
        (FightMode::Controlled, _) => 1,
        (FightMode::Accurate, ATTACK) => 3,
        (FightMode::Aggressive, STRENGTH) => 3,
        (FightMode::Defensive, DEFENSE) => 3,
        _ => 0,
    }
}

pub fn accuracy(mob: &MobCore, npc_multiplier: f32) -> f32 {
    let bonus = style_bonus(mob.fight_mode(), ATTACK) as f32;
    let level = mob.skills().current(ATTACK) as f32 * PRAYER_MULTIPLIER + bonus + 8.0;
    level * (mob.aim_points() as f32 + 64.0) * npc_multiplier
}

pub fn defense(mob: &MobCore, npc_multiplier: f32) -> f32 {
    let bonus = style_bonus(mob.fight_mode(), DEFENSE) as f32;
    let level = mob.skills().current(DEFENSE) as f32 * PRAYER_MULTIPLIER + bonus + 8.0;
    level * (mob.armour_points() as f32 + 64.0) * npc_multiplier
}

pub fn max_hit(mob: &MobCore) -> i32 {
    let bonus = style_bonus(mob.fight_mode(), STRENGTH) as f32;
    let strength = mob.skills().current(STRENGTH) as f32 * PRAYER_MULTIPLIER + bonus;
    ((strength * (mob.power_points() as f32 * 0.00175 + 0.1) + 1.05) * 0.95) as i32
}

/// Hit chance out of 10000, or `None` when the attack can never land.
pub fn hit_chance(accuracy: f32, defense: f32) -> Option<i32> {
    if accuracy * 10.0 < defense {
        return None;
    }
    if accuracy > defense {
        Some(((1.0 - (defense + 2.0) / (2.0 * (accuracy + 1.0))) * 10000.0) as i32)
    } else {
        Some((accuracy / (2.0 * (defense + 1.0)) * 10000.0) as i32)
    }
}

fn multiplier(kind: MobKind) -> f32 {
    match kind {
        MobKind::Npc => NPC_MULTIPLIER,
        MobKind::Player => 1.0,
    }
}

/// Rolls one melee swing from `attacker` at `target`.
pub fn melee_damage<R>(attacker: &dyn MobileEntity, target: &dyn MobileEntity, rng: &mut R) -> i32
where
    R: Rng + ?Sized,
{
    let att = accuracy(attacker.core(), multiplier(attacker.kind()));
    let def = defense(target.core(), multiplier(target.kind()));
    let Some(chance) = hit_chance(att, def) else {
        return 0;
    };
    let roll = rng.gen_range(0..10000);
    if chance > roll {
        return rng.gen_range(0..=max_hit(attacker.core()).max(0));
    }
    0
}
