//! Fleet state: which bots exist and which bot last ran each shard.
//!
//! - [`Bot`] / [`FleetSnapshot`]: one immutable view of the fleet per run
//! - [`BotFleetQuery`]: read-only queries against the task-queue service

pub mod bot;
pub mod query;

pub use bot::{Bot, FleetSnapshot};
pub use query::{shard_tag, BotFleetQuery};
