use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Dialect;
use crate::error::{Result, TriggerError};
use crate::report::ResultAggregator;
use crate::scheduler::Assignment;
use crate::service::TaskQueueService;
use crate::trigger::request::TriggerRequest;
use crate::trigger::response::parse_trigger_dump;

/// Outcome of triggering one shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResult {
    pub shard_index: usize,
    pub shard_count: usize,
    pub task_id: String,
    pub invocation: Option<String>,
    pub bot_id: Option<String>,
    /// Arguments the client was invoked with.
    pub args: Vec<String>,
}

#[derive(Debug)]
pub struct ShardFailure {
    pub shard_index: usize,
    pub error: TriggerError,
}

#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub triggered: Vec<usize>,
    pub failures: Vec<ShardFailure>,
    /// Shards never started because the run was cancelled.
    pub skipped: Vec<usize>,
}

impl DispatchSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Submits one task per planned shard.
#[derive(Clone)]
pub struct TaskTriggerDispatcher {
    service: Arc<dyn TaskQueueService>,
    dialect: Dialect,
    max_concurrent: usize,
}

impl TaskTriggerDispatcher {
    pub fn new(service: Arc<dyn TaskQueueService>, dialect: Dialect) -> Self {
        Self {
            service,
            dialect,
            max_concurrent: 1,
        }
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Trigger a single shard on `bot_id` (or any matching bot when `None`).
    pub async fn trigger_shard(
        &self,
        request: &TriggerRequest,
        shard_index: usize,
        shard_count: usize,
        bot_id: Option<&str>,
    ) -> Result<TriggerResult> {
        let args = request
            .scoped_to_shard(shard_index, shard_count, bot_id)
            .to_args(self.dialect);

        tracing::info!(shard_index, bot_id = ?bot_id, dialect = %self.dialect, "Triggering shard");

        let dump = self
            .service
            .trigger(&args)
            .await
            .map_err(|e| TriggerError::TriggerFailed {
                shard_index,
                reason: e.to_string(),
            })?;
        let task = parse_trigger_dump(dump, self.dialect)?;

        tracing::info!(shard_index, task_id = %task.task_id, "Shard triggered");

        Ok(TriggerResult {
            shard_index,
            shard_count,
            task_id: task.task_id,
            invocation: task.invocation,
            bot_id: bot_id.map(str::to_string),
            args,
        })
    }

    /// Trigger `shards` of `assignment`, merging each result as it arrives.
    ///
    /// Failed shards are recorded, not retried. Once `cancel` fires no new
    /// trigger starts; triggers already submitted are still collected.
    pub async fn dispatch(
        &self,
        request: &TriggerRequest,
        assignment: &Assignment,
        shards: &[usize],
        cancel: &CancellationToken,
        aggregator: &mut ResultAggregator,
    ) -> DispatchSummary {
        let shard_count = assignment.shard_count();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set = JoinSet::new();
        let mut task_shards = HashMap::new();
        let mut summary = DispatchSummary::default();

        for (pos, &shard_index) in shards.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tracing::warn!(remaining = shards.len() - pos, "Run cancelled, skipping shards");
                summary.skipped.extend_from_slice(&shards[pos..]);
                break;
            };

            let dispatcher = self.clone();
            let request = request.clone();
            let bot_id = assignment.bot_for(shard_index).map(str::to_string);
            let handle = set.spawn(async move {
                let result = dispatcher
                    .trigger_shard(&request, shard_index, shard_count, bot_id.as_deref())
                    .await;
                drop(permit);
                (shard_index, result)
            });
            task_shards.insert(handle.id(), shard_index);
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((shard_index, Ok(result))) => {
                    aggregator.merge(&result);
                    summary.triggered.push(shard_index);
                }
                Ok((shard_index, Err(error))) => {
                    tracing::error!(shard_index, error = %error, "Shard trigger failed");
                    summary.failures.push(ShardFailure { shard_index, error });
                }
                Err(e) => {
                    let Some(shard_index) = task_shards.get(&e.id()).copied() else {
                        tracing::error!(error = %e, "Unknown trigger task failed");
                        continue;
                    };
                    tracing::error!(shard_index, error = %e, "Trigger task panicked or was aborted");
                    summary.failures.push(ShardFailure {
                        shard_index,
                        error: TriggerError::TriggerFailed {
                            shard_index,
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }

        summary.triggered.sort_unstable();
        summary.failures.sort_by_key(|f| f.shard_index);
        summary
    }
}
