//! End-to-end runs against the in-memory task queue.
//!
//! These mirror a real invocation: fleet query, shard history lookups,
//! planning, one trigger per shard and the merged report on disk.


use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use affinity_trigger::config::{Dialect, RunConfig, ShardingMode};
use affinity_trigger::error::TriggerError;
use affinity_trigger::report::Report;
use affinity_trigger::runner::{RunOutcome, ShardRunner};
use affinity_trigger::service::Dimension;
use tempfile::TempDir;
use test_harness::{trigger_args, Call, FakeTaskQueue};
use tokio_util::sync::CancellationToken;

async fn run(
    fake: Arc<FakeTaskQueue>,
    config: RunConfig,
    dialect: Dialect,
) -> Result<RunOutcome, TriggerError> {
    let runner = ShardRunner::new(config.with_dialect(dialect), fake);
    runner
        .run(&trigger_args(dialect), CancellationToken::new())
        .await
}

async fn read_report(dir: &TempDir) -> Report {
    let raw = tokio::fs::read(dir.path().join("output.json")).await.unwrap();
    serde_json::from_slice(&raw).unwrap()
}

fn static_config(dir: &TempDir, shard_count: usize) -> RunConfig {
    RunConfig::new(
        ShardingMode::Static { shard_count },
        dir.path().join("output.json"),
    )
}

#[tokio::test]
async fn test_static_run_preserves_affinity() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(
        Dialect::Go,
        &["build3", "build4", "build5"],
        &["build1", "build2"],
    )
    .with_previous(&[(0, "build3"), (1, "build4"), (2, "build5")])
    .into_shared();

    let outcome = run(fake.clone(), static_config(&dir, 3), Dialect::Go)
        .await
        .unwrap();

    assert!(outcome.is_success());
    let triggered = fake.triggered_shard_to_bot();
    assert_eq!(triggered.get(&0).map(String::as_str), Some("build3"));
    assert_eq!(triggered.get(&1).map(String::as_str), Some("build4"));
    assert_eq!(triggered.get(&2).map(String::as_str), Some("build5"));

    // One fleet query plus one history query per shard.
    assert_eq!(fake.query_count(), 4);
}

#[tokio::test]
async fn test_queries_carry_run_dimensions_and_shard_tags() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1", "build2"], &[])
        .with_previous(&[(0, "build1"), (1, "build2")])
        .into_shared();

    run(fake.clone(), static_config(&dir, 2), Dialect::Go)
        .await
        .unwrap();

    let calls = fake.calls();
    assert_eq!(
        calls[0],
        Call::ListBots(vec![
            Dimension::new("pool", "chrome-perf-fyi"),
            Dimension::new("os", "windows"),
        ])
    );
    let shard_tags: HashSet<String> = calls
        .iter()
        .filter_map(|c| match c {
            Call::ListTasks(tags) => {
                assert!(tags.contains(&"pool:chrome-perf-fyi".to_string()));
                tags.iter().find(|t| t.starts_with("shard:")).cloned()
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        shard_tags,
        HashSet::from(["shard:0".to_string(), "shard:1".to_string()])
    );
}

#[tokio::test]
async fn test_dead_bots_swapped_and_report_written() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(
        Dialect::Go,
        &["build3", "build4", "build5"],
        &["build1", "build2"],
    )
    .with_previous(&[(0, "build1"), (1, "build2"), (2, "build3")])
    .into_shared();

    run(fake.clone(), static_config(&dir, 3), Dialect::Go)
        .await
        .unwrap();

    let triggered = fake.triggered_shard_to_bot();
    let bots: HashSet<&str> = triggered.values().map(String::as_str).collect();
    assert_eq!(bots.len(), 3);
    assert_eq!(triggered.get(&2).map(String::as_str), Some("build3"));

    let report = read_report(&dir).await;
    assert_eq!(report.len(), 3);
    let entry = report.get("f1:1:3").unwrap();
    assert_eq!(entry.shard_index, 1);
    assert_eq!(entry.task_id, "f1");
    assert_eq!(entry.invocation.as_deref(), Some("task-f1"));
}

#[tokio::test]
async fn test_scarcity_recycles_dead_bot_for_never_run_shard() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(
        Dialect::Go,
        &["build3", "build4", "build5"],
        &["build1", "build2"],
    )
    .with_previous(&[
        (0, "build1"),
        (1, ""),
        (2, "build3"),
        (3, "build4"),
        (4, "build5"),
    ])
    .into_shared();

    run(fake.clone(), static_config(&dir, 5), Dialect::Go)
        .await
        .unwrap();

    let triggered = fake.triggered_shard_to_bot();
    let expected = ["build1", "build2", "build3", "build4", "build5"];
    for (i, bot) in expected.iter().enumerate() {
        assert_eq!(triggered.get(&i).map(String::as_str), Some(*bot));
    }
}

#[tokio::test]
async fn test_dynamic_run_skips_history_queries() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(
        Dialect::Go,
        &["build2", "build5", "build3"],
        &["build1", "build4"],
    )
    .with_previous(&[(0, "build301"), (1, "build1--"), (2, "build-blah")])
    .into_shared();

    let config = RunConfig::new(ShardingMode::Dynamic, dir.path().join("output.json"));
    let outcome = run(fake.clone(), config, Dialect::Go).await.unwrap();

    assert_eq!(fake.query_count(), 1);
    assert_eq!(outcome.assignment.shard_count(), 3);
    let bots: HashSet<String> = fake.triggered_shard_to_bot().into_values().collect();
    assert_eq!(
        bots,
        HashSet::from([
            "build2".to_string(),
            "build3".to_string(),
            "build5".to_string()
        ])
    );
    assert!(fake
        .trigger_runs()
        .iter()
        .all(|args| args.contains(&"GTEST_TOTAL_SHARDS=3".to_string())));
}

#[tokio::test]
async fn test_no_bots_fails_before_triggering() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &[], &[])
        .with_previous(&[(0, "build1")])
        .into_shared();

    let err = run(fake.clone(), static_config(&dir, 1), Dialect::Go)
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::InsufficientCapacity { .. }));
    assert!(fake.trigger_runs().is_empty());
    assert!(!dir.path().join("output.json").exists());
}

#[tokio::test]
async fn test_service_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1"], &[])
        .with_failing_queries()
        .into_shared();

    let err = run(fake.clone(), static_config(&dir, 1), Dialect::Go)
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::ServiceQuery(_)));
    assert!(fake.trigger_runs().is_empty());
}

#[tokio::test]
async fn test_malformed_dimension_triggers_nothing() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Legacy, &["build1"], &[]).into_shared();
    let runner = ShardRunner::new(
        static_config(&dir, 1).with_dialect(Dialect::Legacy),
        fake.clone(),
    );

    let bad_args = test_harness::args(&["trigger", "--swarming", "s", "--dimension", "pool"]);
    let err = runner
        .run(&bad_args, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::MalformedArguments(_)));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_legacy_dialect_report_has_no_invocation() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Legacy, &["build1", "build2"], &[])
        .with_previous(&[(0, "build2"), (1, "build1")])
        .into_shared();

    run(fake.clone(), static_config(&dir, 2), Dialect::Legacy)
        .await
        .unwrap();

    let runs = fake.trigger_runs();
    assert!(runs.iter().all(|args| args.contains(&"--swarming".to_string())));
    assert!(runs.iter().all(|args| args
        .windows(3)
        .any(|w| w == ["--env", "GTEST_TOTAL_SHARDS", "2"])));
    let triggered = fake.triggered_shard_to_bot();
    assert_eq!(triggered.get(&0).map(String::as_str), Some("build2"));
    assert_eq!(triggered.get(&1).map(String::as_str), Some("build1"));

    let report = read_report(&dir).await;
    let entry = report.get("f0:0:2").unwrap();
    assert!(entry.invocation.is_none());
}

#[tokio::test]
async fn test_single_shard_index() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1", "build2", "build3"], &[])
        .with_previous(&[(0, "build1"), (1, "build2"), (2, "build3")])
        .into_shared();

    let config = static_config(&dir, 3).with_shard_index(1);
    let outcome = run(fake.clone(), config, Dialect::Go).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.assignment.shard_count(), 3);
    let triggered = fake.triggered_shard_to_bot();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered.get(&1).map(String::as_str), Some("build2"));
    assert!(read_report(&dir).await.get("f1:1:3").is_some());
}

#[tokio::test]
async fn test_shard_index_out_of_range() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1"], &[]).into_shared();

    let config = static_config(&dir, 1).with_shard_index(4);
    let err = run(fake.clone(), config, Dialect::Go).await.unwrap_err();

    assert!(matches!(err, TriggerError::MalformedArguments(_)));
    assert!(fake.trigger_runs().is_empty());
}

#[tokio::test]
async fn test_partial_failure_still_writes_report() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1", "build2", "build3"], &[])
        .with_failing_shard(1)
        .into_shared();

    let outcome = run(fake.clone(), static_config(&dir, 3), Dialect::Go)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.dispatch.triggered, vec![0, 2]);
    assert_eq!(outcome.dispatch.failures.len(), 1);
    assert_eq!(outcome.dispatch.failures[0].shard_index, 1);
    assert!(matches!(
        outcome.dispatch.failures[0].error,
        TriggerError::TriggerFailed { shard_index: 1, .. }
    ));

    let report = read_report(&dir).await;
    assert_eq!(report.len(), 2);
    assert!(report.get("f0:0:3").is_some());
    assert!(report.get("f2:2:3").is_some());
    assert!(report.entry_for_shard(1).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_run_stuck_on_fleet_query() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1"], &[])
        .with_hanging_queries()
        .into_shared();

    let config = static_config(&dir, 1).with_timeout(Duration::from_secs(30));
    let err = run(fake.clone(), config, Dialect::Go).await.unwrap_err();

    assert!(matches!(err, TriggerError::Cancelled(_)));
    assert_eq!(fake.query_count(), 1);
    assert!(fake.trigger_runs().is_empty());
    assert!(!dir.path().join("output.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_signal_stops_run_stuck_on_fleet_query() {
    let dir = TempDir::new().unwrap();
    let fake = FakeTaskQueue::new(Dialect::Go, &["build1"], &[])
        .with_hanging_queries()
        .into_shared();
    let runner = ShardRunner::new(static_config(&dir, 1), fake.clone());
    let cancel = CancellationToken::new();

    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        stop.cancel();
    });
    let err = runner
        .run(&trigger_args(Dialect::Go), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, TriggerError::Cancelled(_)));
    assert!(fake.trigger_runs().is_empty());
}
