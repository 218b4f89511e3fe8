//! `world_server`
//!
//! Server-side systems:
//! - Fixed-interval world tick (movement, NPC wandering, view sync)
//! - Per-connection reader, writer and coordination tasks
//! - Intent dispatch, object actions and in-game commands
//! - Player persistence behind an async trait
//!
//! Networking model:
//! - TCP only; length-prefixed JSON frames
//! - Bounded queues in both directions; a client that cannot keep up is
//!   dropped rather than silently desynchronized

pub mod actions;
pub mod commands;
pub mod connection;
pub mod handlers;
pub mod server;
pub mod store;

pub use server::GameServer;
