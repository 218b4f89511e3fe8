//! Non-player characters and their idle wandering.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::warn;

use crate::{
    entity::{MobCore, MobKind, MobileEntity},
    grid::Grid,
    location::Location,
    lock,
    property_bag::{keys, PropValue},
    skills::SkillTable,
};

/// Players must be this close for an NPC to bother wandering.
pub const WANDER_ACTIVATION_RADIUS: i32 = 32;
/// Wander cooldown bounds in seconds.
pub const WANDER_COOLDOWN_SECS: std::ops::RangeInclusive<i64> = 5..=15;

#[derive(Debug)]
pub struct Npc {
    core: MobCore,
    id: u32,
    start: Location,
    min: Location,
    max: Location,
}

impl Npc {
    pub fn new(
        index: usize,
        id: u32,
        start: Location,
        min: Location,
        max: Location,
        skills: SkillTable,
    ) -> Self {
        Self {
            core: MobCore::new(index, start, skills),
            id,
            start,
            min,
            max,
        }
    }

    /// Definition id.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn start(&self) -> Location {
        self.start
    }

    /// Wander boundary corners.
    pub fn bounds(&self) -> (Location, Location) {
        (self.min, self.max)
    }

    pub fn next_move(&self) -> DateTime<Utc> {
        self.core
            .transients()
            .var_time(keys::NEXT_MOVE, DateTime::<Utc>::MIN_UTC)
    }

    /// Picks a fresh wander destination when the NPC is idle, its cooldown
    /// has elapsed and a player is close enough to see it. Returns `true`
    /// when a new path was set.
    pub fn wander<R: Rng + ?Sized>(&self, grid: &Grid, now: DateTime<Utc>, rng: &mut R) -> bool {
        let here = self.core.location();
        if self.core.busy() || self.core.is_fighting() || here == Location::DEATH_SPOT {
            return false;
        }
        if self.next_move() >= now {
            return false;
        }
        if grid.players_within(here, WANDER_ACTIVATION_RADIUS).is_empty() {
            return false;
        }
        let cooldown = rng.gen_range(WANDER_COOLDOWN_SECS);
        self.core.transients().set_var(
            keys::NEXT_MOVE,
            PropValue::Time(now + Duration::seconds(cooldown)),
        );
        self.core
            .walk_to(Location::random_within(self.min, self.max, rng));
        true
    }
}

impl MobileEntity for Npc {
    fn core(&self) -> &MobCore {
        &self.core
    }

    fn kind(&self) -> MobKind {
        MobKind::Npc
    }

    fn set_location(self: &Arc<Self>, grid: &Grid, to: Location, teleport: bool) {
        if !to.is_valid() {
            warn!(npc = self.core.index(), %to, "Refusing to move NPC outside the world");
            return;
        }
        let mut loc = lock::write(self.core.location_lock());
        let from = *loc;
        if !Grid::same_cell(from, to) {
            grid.cell_for(from).remove_npc(self.core.index());
            grid.cell_for(to).add_npc(Arc::clone(self));
        }
        *loc = to;
        drop(loc);
        self.core.note_relocation(from, to, teleport);
    }
}
