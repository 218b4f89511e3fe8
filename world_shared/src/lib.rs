//! `world_shared`
//!
//! World-state library used by the server and the test crate.
//!
//! Design goals:
//! - One authoritative [`world::World`] shared as `Arc<World>`.
//! - Fine-grained `std::sync` locks; no lock is held across a tick.
//! - Clear separation of concerns (grid, entities, movement, view, net).
//! - No `unsafe`.

pub mod appearance;
pub mod collision;
pub mod combat;
pub mod config;
pub mod definitions;
pub mod entity;
pub mod grid;
pub mod kill;
pub mod location;
pub mod lock;
pub mod movement;
pub mod net;
pub mod npc;
pub mod object;
pub mod pathway;
pub mod player;
pub mod property_bag;
pub mod skills;
pub mod view;
pub mod world;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::appearance::Appearance;
    pub use crate::config::*;
    pub use crate::entity::{MobKind, MobRef, MobState, MobileEntity};
    pub use crate::kill::KillSignal;
    pub use crate::location::*;
    pub use crate::net::*;
    pub use crate::npc::Npc;
    pub use crate::player::{Player, Session};
    pub use crate::world::World;
}
