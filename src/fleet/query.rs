use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::{Result, TriggerError};
use crate::fleet::{Bot, FleetSnapshot};
use crate::scheduler::PreviousAssignment;
use crate::service::{Dimension, TaskQueueService};

/// Tag attached to every triggered task so the next run can find it.
pub fn shard_tag(shard_index: usize) -> String {
    format!("shard:{}", shard_index)
}

/// Read-only queries about the fleet and its history.
#[derive(Clone)]
pub struct BotFleetQuery {
    service: Arc<dyn TaskQueueService>,
    dimensions: Vec<Dimension>,
}

impl BotFleetQuery {
    pub fn new(service: Arc<dyn TaskQueueService>, dimensions: Vec<Dimension>) -> Self {
        Self {
            service,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Every bot matching the run's dimensions, eligible or not.
    pub async fn snapshot(&self) -> Result<FleetSnapshot> {
        let response = self.service.list_bots(&self.dimensions).await?;
        let snapshot = FleetSnapshot::new(response.items.into_iter().map(Bot::from));
        tracing::info!(
            total = snapshot.len(),
            eligible = snapshot.eligible_count(),
            "Fleet snapshot taken"
        );
        Ok(snapshot)
    }

    pub async fn list_eligible_bots(&self) -> Result<Vec<Bot>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.eligible().cloned().collect())
    }

    /// Bot that ran the most recent task for `shard_index`, or `""` when the
    /// shard has never been triggered.
    pub async fn previous_bot_for_shard(&self, shard_index: usize) -> Result<String> {
        let mut tags: Vec<String> = self.dimensions.iter().map(Dimension::as_tag).collect();
        tags.push(shard_tag(shard_index));

        let response = self.service.list_tasks(&tags, 1).await?;
        let bot_id = response
            .items
            .first()
            .and_then(|task| task.executing_bot())
            .unwrap_or_default()
            .to_string();

        tracing::debug!(shard_index, bot_id = %bot_id, "Previous bot for shard");
        Ok(bot_id)
    }

    /// Previous bot of every shard in `[0, shard_count)`, queried concurrently.
    pub async fn previous_assignment(&self, shard_count: usize) -> Result<PreviousAssignment> {
        let mut set = JoinSet::new();
        for shard_index in 0..shard_count {
            let query = self.clone();
            set.spawn(async move {
                let bot_id = query.previous_bot_for_shard(shard_index).await;
                (shard_index, bot_id)
            });
        }

        let mut previous = PreviousAssignment::default();
        while let Some(joined) = set.join_next().await {
            let (shard_index, bot_id) = joined.map_err(|e| {
                TriggerError::ServiceQuery(format!("previous bot query aborted: {}", e))
            })?;
            previous.insert(shard_index, bot_id?);
        }
        Ok(previous)
    }
}
