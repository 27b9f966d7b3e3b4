use std::collections::{HashSet, VecDeque};

use crate::config::ShardingMode;
use crate::error::{Result, TriggerError};
use crate::fleet::FleetSnapshot;
use crate::scheduler::assignment::{Assignment, PreviousAssignment};

/// Computes which bot runs which shard.
///
/// Pure: everything it needs is in the snapshot and the previous assignment.
#[derive(Debug, Clone, Copy)]
pub struct ShardAssignmentPlanner {
    mode: ShardingMode,
}

impl ShardAssignmentPlanner {
    pub fn new(mode: ShardingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ShardingMode {
        self.mode
    }

    /// `previous` is ignored in dynamic mode.
    pub fn plan(&self, fleet: &FleetSnapshot, previous: &PreviousAssignment) -> Result<Assignment> {
        match self.mode {
            ShardingMode::Dynamic => plan_dynamic(fleet),
            ShardingMode::Static { shard_count } => plan_static(fleet, shard_count, previous),
        }
    }
}

/// One shard per eligible bot, in fleet order.
pub fn plan_dynamic(fleet: &FleetSnapshot) -> Result<Assignment> {
    let shards: Vec<Option<String>> = fleet.eligible().map(|b| Some(b.id.clone())).collect();
    if shards.is_empty() {
        return Err(TriggerError::InsufficientCapacity {
            requested: 1,
            available: 0,
        });
    }
    tracing::info!(shard_count = shards.len(), "Planned dynamic shards");
    Ok(Assignment::new(shards))
}

/// Fixed shard count with affinity to the previous run.
///
/// 1. A shard keeps its previous bot if that bot is eligible and no
///    lower-indexed shard claimed it first.
/// 2. Remaining shards take unclaimed eligible bots in fleet order.
/// 3. Once eligible bots run out, a shard falls back to its previous bot
///    whatever its state. A shard that never ran gets an ineligible bot that
///    nobody else holds or falls back to, else no bot at all.
pub fn plan_static(
    fleet: &FleetSnapshot,
    shard_count: usize,
    previous: &PreviousAssignment,
) -> Result<Assignment> {
    let eligible: Vec<&str> = fleet.eligible().map(|b| b.id.as_str()).collect();
    if eligible.is_empty() {
        return Err(TriggerError::InsufficientCapacity {
            requested: shard_count,
            available: 0,
        });
    }

    let mut pool: HashSet<&str> = eligible.iter().copied().collect();
    let mut shards: Vec<Option<String>> = vec![None; shard_count];
    let mut unresolved = Vec::new();

    for (shard_index, slot) in shards.iter_mut().enumerate() {
        match previous.get(shard_index) {
            Some(prev) if pool.remove(prev) => {
                *slot = Some(prev.to_string());
            }
            _ => unresolved.push(shard_index),
        }
    }

    let mut free: VecDeque<&str> = eligible.into_iter().filter(|id| pool.contains(id)).collect();
    let mut scarce = Vec::new();
    for shard_index in unresolved {
        match free.pop_front() {
            Some(bot_id) => {
                tracing::debug!(shard_index, bot_id, "Shard moved to a free bot");
                shards[shard_index] = Some(bot_id.to_string());
            }
            None => scarce.push(shard_index),
        }
    }

    if !scarce.is_empty() {
        tracing::warn!(
            shards = ?scarce,
            "Not enough eligible bots, falling back to previous assignment"
        );

        let held: HashSet<String> = shards
            .iter()
            .filter_map(|b| b.clone())
            .chain(
                scarce
                    .iter()
                    .filter_map(|&i| previous.get(i).map(str::to_string)),
            )
            .collect();
        let mut recyclable = fleet
            .ineligible()
            .map(|b| b.id.as_str())
            .filter(|id| !held.contains(*id));

        for shard_index in scarce {
            let bot_id = previous.get(shard_index).or_else(|| recyclable.next());
            if bot_id.is_none() {
                tracing::warn!(shard_index, "No bot left for never-run shard");
            }
            shards[shard_index] = bot_id.map(str::to_string);
        }
    }

    Ok(Assignment::new(shards))
}
