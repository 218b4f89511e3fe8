//! Shared mobile-entity model.
//!
//! Players and NPCs both embed a [`MobCore`]: index, location, skills and a
//! [`PropertyBag`] of transient state. The [`MobileEntity`] trait is the
//! capability set the rest of the engine works against; each kind supplies
//! its own grid re-registration when it moves.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{
    combat::FightMode,
    grid::Grid,
    location::{Direction, Location},
    lock,
    pathway::Pathway,
    property_bag::{keys, PropValue, PropertyBag},
    skills::SkillTable,
};

bitflags::bitflags! {
    /// What a mob is currently doing. Any set bit makes the mob busy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MobState: u32 {
        const IDLE = 0;
        const BANKING = 1 << 0;
        const CHATTING = 1 << 1;
        const MENU_CHOOSING = 1 << 2;
        const TRADING = 1 << 3;
        const DUELING = 1 << 4;
        const FIGHTING = 1 << 5;
        const BATCHING = 1 << 6;
        const SLEEPING = 1 << 7;
        const BUSY = 1 << 8;
        const CHANGING_APPEARANCE = 1 << 9;
    }
}

/// Which kind of mob a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobKind {
    Player,
    Npc,
}

/// Weak, index-based reference to a mob, safe to keep in property bags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobRef {
    Player(usize),
    Npc(usize),
}

impl MobRef {
    pub fn kind(&self) -> MobKind {
        match self {
            MobRef::Player(_) => MobKind::Player,
            MobRef::Npc(_) => MobKind::Npc,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            MobRef::Player(i) | MobRef::Npc(i) => *i,
        }
    }
}

/// Hands out the lowest free index below a fixed capacity.
#[derive(Debug)]
pub struct IndexPool {
    capacity: usize,
    next: usize,
    free: BTreeSet<usize>,
}

impl IndexPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next: 0,
            free: BTreeSet::new(),
        }
    }

    /// Returns `None` when every index is in use.
    pub fn acquire(&mut self) -> Option<usize> {
        if let Some(idx) = self.free.pop_first() {
            return Some(idx);
        }
        if self.next >= self.capacity {
            return None;
        }
        let idx = self.next;
        self.next += 1;
        Some(idx)
    }

    /// Returns an index to the pool. Releasing an index that was never handed
    /// out, or releasing it twice, is reported and ignored.
    pub fn release(&mut self, idx: usize) -> bool {
        if idx >= self.next || !self.free.insert(idx) {
            warn!(index = idx, "Released an index that is not in use");
            return false;
        }
        true
    }

    pub fn in_use(&self) -> usize {
        self.next - self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// State shared by every mobile entity.
#[derive(Debug)]
pub struct MobCore {
    index: usize,
    location: RwLock<Location>,
    transients: PropertyBag,
    skills: SkillTable,
}

impl MobCore {
    pub fn new(index: usize, location: Location, skills: SkillTable) -> Self {
        Self {
            index,
            location: RwLock::new(location),
            transients: PropertyBag::new(),
            skills,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn location(&self) -> Location {
        *lock::read(&self.location)
    }

    pub fn at_location(&self, l: Location) -> bool {
        self.location() == l
    }

    /// Write access to the location for the owning kind's `set_location`,
    /// which must hold it across grid re-registration.
    pub(crate) fn location_lock(&self) -> &RwLock<Location> {
        &self.location
    }

    pub fn transients(&self) -> &PropertyBag {
        &self.transients
    }

    pub fn skills(&self) -> &SkillTable {
        &self.skills
    }

    // ─── State flags ───

    pub fn state(&self) -> MobState {
        MobState::from_bits_truncate(self.transients.var_int(keys::STATE, 0) as u32)
    }

    pub fn has_state(&self, state: MobState) -> bool {
        self.state().contains(state)
    }

    /// Adds `state`. Adding a state the mob already holds does nothing.
    pub fn add_state(&self, state: MobState) {
        if !state.is_empty() && self.has_state(state) {
            warn!(index = self.index, ?state, "Attempted to add a mob state that is already set");
            return;
        }
        self.transients.mask_int(keys::STATE, state.bits() as i64);
    }

    /// Removes `state`. Removing an unheld state is ignored.
    pub fn remove_state(&self, state: MobState) {
        if !self.state().intersects(state) {
            return;
        }
        self.transients.unmask_int(keys::STATE, state.bits() as i64);
    }

    pub fn busy(&self) -> bool {
        self.state() != MobState::IDLE
    }

    // ─── Facing and sync flags ───

    pub fn direction(&self) -> Direction {
        Direction::from_i64(self.transients.var_int(keys::DIRECTION, Direction::North as i64))
    }

    pub fn set_direction(&self, direction: Direction) {
        self.mark_changed();
        self.transients
            .set_var(keys::DIRECTION, PropValue::Int(direction as i64));
    }

    pub fn mark_moved(&self) {
        self.transients.set_var(keys::MOVED, PropValue::Bool(true));
    }

    pub fn mark_changed(&self) {
        self.transients.set_var(keys::CHANGED, PropValue::Bool(true));
    }

    pub fn mark_removed(&self) {
        self.transients.set_var(keys::REMOVED, PropValue::Bool(true));
    }

    pub fn has_moved(&self) -> bool {
        self.transients.var_bool(keys::MOVED, false)
    }

    pub fn has_changed(&self) -> bool {
        self.transients.var_bool(keys::CHANGED, false)
    }

    pub fn was_removed(&self) -> bool {
        self.transients.var_bool(keys::REMOVED, false)
    }

    /// Clears the per-tick sync flags.
    pub fn reset_sync_flags(&self) {
        self.transients.unset_var(keys::MOVED);
        self.transients.unset_var(keys::CHANGED);
        self.transients.unset_var(keys::REMOVED);
    }

    /// Records the effect of a location change on facing and sync flags.
    pub(crate) fn note_relocation(&self, from: Location, to: Location, teleport: bool) {
        if teleport {
            self.mark_removed();
        } else {
            self.set_direction(from.direction_to(to.x, to.y));
            self.mark_moved();
        }
    }

    // ─── Paths ───

    pub fn path(&self) -> Option<Pathway> {
        self.transients.var_path(keys::PATH)
    }

    pub fn set_path(&self, path: Pathway) {
        self.transients.set_var(keys::PATH, PropValue::Path(path));
    }

    pub fn reset_path(&self) {
        self.transients.unset_var(keys::PATH);
    }

    pub fn walk_to(&self, end: Location) {
        self.set_path(Pathway::to(end));
    }

    /// True when there is no path or the path has nothing left to walk.
    pub fn finished_path(&self) -> bool {
        self.path().map_or(true, |p| p.is_finished())
    }

    // ─── Combat state ───

    pub fn fight_target(&self) -> Option<MobRef> {
        self.transients.var_mob(keys::FIGHT_TARGET)
    }

    pub fn set_fight_target(&self, target: MobRef) {
        self.transients.set_var(keys::FIGHT_TARGET, PropValue::Mob(target));
    }

    pub fn is_fighting(&self) -> bool {
        self.has_state(MobState::FIGHTING) && self.fight_target().is_some()
    }

    pub fn fight_round(&self) -> i64 {
        self.transients.var_int(keys::FIGHT_ROUND, 0)
    }

    pub fn set_fight_round(&self, round: i64) {
        self.transients.set_var(keys::FIGHT_ROUND, PropValue::Int(round));
    }

    /// Drops the fight target and fighting state, faces north and stamps the
    /// end of the fight. Does nothing when the mob is not fighting.
    pub fn end_fight(&self, now: DateTime<Utc>) {
        if !self.is_fighting() {
            return;
        }
        self.transients.unset_var(keys::FIGHT_TARGET);
        self.transients.unset_var(keys::FIGHT_ROUND);
        self.set_direction(Direction::North);
        self.remove_state(MobState::FIGHTING);
        self.transients.set_var(keys::LAST_FIGHT, PropValue::Time(now));
    }

    pub fn last_fight(&self) -> DateTime<Utc> {
        self.transients.var_time(keys::LAST_FIGHT, DateTime::<Utc>::MIN_UTC)
    }

    pub fn last_retreat(&self) -> DateTime<Utc> {
        self.transients.var_time(keys::LAST_RETREAT, DateTime::<Utc>::MIN_UTC)
    }

    pub fn update_last_retreat(&self, now: DateTime<Utc>) {
        self.transients.set_var(keys::LAST_RETREAT, PropValue::Time(now));
    }

    pub fn fight_mode(&self) -> FightMode {
        FightMode::from_i64(self.transients.var_int(keys::FIGHT_MODE, 0))
    }

    pub fn set_fight_mode(&self, mode: FightMode) {
        self.transients
            .set_var(keys::FIGHT_MODE, PropValue::Int(mode as i64));
    }

    pub fn aim_points(&self) -> i64 {
        self.transients.var_int(keys::AIM_POINTS, 1)
    }

    pub fn power_points(&self) -> i64 {
        self.transients.var_int(keys::POWER_POINTS, 1)
    }

    pub fn armour_points(&self) -> i64 {
        self.transients.var_int(keys::ARMOUR_POINTS, 1)
    }

    pub fn set_equipment_points(&self, aim: i64, power: i64, armour: i64) {
        self.transients.set_var(keys::AIM_POINTS, PropValue::Int(aim));
        self.transients.set_var(keys::POWER_POINTS, PropValue::Int(power));
        self.transients.set_var(keys::ARMOUR_POINTS, PropValue::Int(armour));
    }
}

/// Capability set shared by players and NPCs.
pub trait MobileEntity: Send + Sync {
    fn core(&self) -> &MobCore;

    fn kind(&self) -> MobKind;

    /// Moves the mob to `to`, keeping its grid registration in step. A
    /// teleport raises the removed flag instead of the moved flag.
    fn set_location(self: &Arc<Self>, grid: &Grid, to: Location, teleport: bool)
    where
        Self: Sized;

    fn mob_ref(&self) -> MobRef {
        match self.kind() {
            MobKind::Player => MobRef::Player(self.core().index()),
            MobKind::Npc => MobRef::Npc(self.core().index()),
        }
    }

    fn index(&self) -> usize {
        self.core().index()
    }

    fn location(&self) -> Location {
        self.core().location()
    }

    fn skills(&self) -> &SkillTable {
        self.core().skills()
    }

    fn transients(&self) -> &PropertyBag {
        self.core().transients()
    }

    /// Jumps straight to `to`, abandoning any path.
    fn teleport(self: &Arc<Self>, grid: &Grid, to: Location)
    where
        Self: Sized,
    {
        self.core().reset_path();
        self.set_location(grid, to, true);
    }
}
