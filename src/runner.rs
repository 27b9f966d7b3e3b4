use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{RunConfig, ShardingMode};
use crate::error::{Result, TriggerError};
use crate::fleet::BotFleetQuery;
use crate::report::{Report, ResultAggregator};
use crate::scheduler::{Assignment, PreviousAssignment, ShardAssignmentPlanner};
use crate::service::TaskQueueService;
use crate::shutdown::cancel_after;
use crate::trigger::{DispatchSummary, TaskTriggerDispatcher, TriggerRequest};

/// What one run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub assignment: Assignment,
    pub report: Report,
    pub dispatch: DispatchSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.dispatch.is_success()
    }
}

/// Drives one trigger run: fleet query, planning, dispatch and report.
pub struct ShardRunner {
    config: RunConfig,
    service: Arc<dyn TaskQueueService>,
}

impl ShardRunner {
    pub fn new(config: RunConfig, service: Arc<dyn TaskQueueService>) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run once with `args` as the trigger arguments (in the configured
    /// dialect).
    ///
    /// Query, planning and argument errors abort before anything is
    /// triggered. Per-shard trigger failures do not: they are recorded in
    /// [`RunOutcome::dispatch`] and the report is still written.
    pub async fn run(&self, args: &[String], cancel: CancellationToken) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.run_inner(run_id, args, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        args: &[String],
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let _deadline = self
            .config
            .timeout
            .map(|timeout| cancel_after(&cancel, timeout));

        let request = TriggerRequest::parse(args, self.config.dialect)?;
        let assignment = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Run cancelled while planning, nothing triggered");
                return Err(TriggerError::Cancelled(
                    "stopped before planning finished".to_string(),
                ));
            }
            assignment = self.plan(&request) => assignment?,
        };

        let shards = self.shards_to_trigger(&assignment)?;
        let dispatcher = TaskTriggerDispatcher::new(self.service.clone(), self.config.dialect)
            .with_max_concurrent(self.config.max_concurrent_triggers);
        let mut aggregator = ResultAggregator::new();
        let dispatch = dispatcher
            .dispatch(&request, &assignment, &shards, &cancel, &mut aggregator)
            .await;

        aggregator.write(&self.config.dump_json).await?;

        let finished_at = Utc::now();
        tracing::info!(
            triggered = dispatch.triggered.len(),
            failed = dispatch.failures.len(),
            skipped = dispatch.skipped.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Run finished"
        );

        Ok(RunOutcome {
            run_id,
            assignment,
            report: aggregator.into_report(),
            dispatch,
            started_at,
            finished_at,
        })
    }

    /// Query the fleet (and in static mode the shard history) and plan.
    pub async fn plan(&self, request: &TriggerRequest) -> Result<Assignment> {
        let query = BotFleetQuery::new(self.service.clone(), request.dimensions());
        let fleet = query.snapshot().await?;

        let previous = match self.config.sharding {
            ShardingMode::Static { shard_count } => {
                query.previous_assignment(shard_count).await?
            }
            ShardingMode::Dynamic => PreviousAssignment::default(),
        };

        let assignment = ShardAssignmentPlanner::new(self.config.sharding).plan(&fleet, &previous)?;
        if self.config.verbose {
            for (shard_index, bot_id) in assignment.iter() {
                tracing::info!(
                    shard_index,
                    previous = previous.get(shard_index).unwrap_or(""),
                    bot_id = bot_id.unwrap_or(""),
                    "Shard assignment"
                );
            }
        }
        Ok(assignment)
    }

    fn shards_to_trigger(&self, assignment: &Assignment) -> Result<Vec<usize>> {
        match self.config.shard_index {
            Some(i) if i < assignment.shard_count() => Ok(vec![i]),
            Some(i) => Err(TriggerError::MalformedArguments(format!(
                "shard index {} out of range for {} shard(s)",
                i,
                assignment.shard_count()
            ))),
            None => Ok((0..assignment.shard_count()).collect()),
        }
    }
}
