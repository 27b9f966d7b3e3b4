//! Merged trigger results.
//!
//! Every triggered shard becomes one entry in the [`Report`] keyed
//! `<task_id>:<shard_index>:<shard_count>`. The [`ResultAggregator`] is the
//! only writer; it is fed one [`TriggerResult`] at a time and may be handed
//! any subset of the planned shards (a run cut short still produces a valid
//! report).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trigger::TriggerResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub shard_index: usize,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub tasks: BTreeMap<String, ReportEntry>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ReportEntry> {
        self.tasks.get(key)
    }

    /// Entry for a shard, whatever its task id.
    pub fn entry_for_shard(&self, shard_index: usize) -> Option<&ReportEntry> {
        self.tasks.values().find(|e| e.shard_index == shard_index)
    }
}

/// `<task_id>:<shard_index>:<shard_count>`
pub fn report_key(task_id: &str, shard_index: usize, shard_count: usize) -> String {
    format!("{}:{}:{}", task_id, shard_index, shard_count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Unchanged,
    Replaced,
}

#[derive(Debug, Default)]
pub struct ResultAggregator {
    report: Report,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, result: &TriggerResult) -> MergeOutcome {
        let key = report_key(&result.task_id, result.shard_index, result.shard_count);
        let entry = ReportEntry {
            shard_index: result.shard_index,
            task_id: result.task_id.clone(),
            invocation: result.invocation.clone(),
        };

        match self.report.tasks.insert(key.clone(), entry) {
            None => MergeOutcome::Inserted,
            Some(old) if self.report.tasks.get(&key) == Some(&old) => MergeOutcome::Unchanged,
            Some(_) => {
                tracing::warn!(key = %key, "Report entry replaced with different content");
                MergeOutcome::Replaced
            }
        }
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn into_report(self) -> Report {
        self.report
    }

    /// Write the report as pretty JSON.
    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.report)?;
        tokio::fs::write(path, json).await?;
        tracing::info!(path = %path.display(), tasks = self.report.len(), "Report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(task_id: &str, shard_index: usize, invocation: Option<&str>) -> TriggerResult {
        TriggerResult {
            shard_index,
            shard_count: 1,
            task_id: task_id.to_string(),
            invocation: invocation.map(str::to_string),
            bot_id: Some("build1".to_string()),
            args: vec!["trigger".to_string()],
        }
    }

    #[test]
    fn key_format() {
        assert_eq!(report_key("f0", 0, 1), "f0:0:1");
        assert_eq!(report_key("abc", 3, 12), "abc:3:12");
    }

    #[test]
    fn merge_is_idempotent() {
        let mut aggregator = ResultAggregator::new();
        let r = result("f0", 0, Some("task-f0"));

        assert_eq!(aggregator.merge(&r), MergeOutcome::Inserted);
        let before = aggregator.report().clone();
        assert_eq!(aggregator.merge(&r), MergeOutcome::Unchanged);
        assert_eq!(aggregator.report(), &before);
        assert_eq!(aggregator.report().len(), 1);
    }

    #[test]
    fn merge_replaces_differing_content() {
        let mut aggregator = ResultAggregator::new();
        aggregator.merge(&result("f0", 0, None));
        assert_eq!(
            aggregator.merge(&result("f0", 0, Some("inv"))),
            MergeOutcome::Replaced
        );
        assert_eq!(
            aggregator.report().get("f0:0:1").unwrap().invocation.as_deref(),
            Some("inv")
        );
    }

    #[test]
    fn invocation_omitted_when_absent() {
        let mut aggregator = ResultAggregator::new();
        aggregator.merge(&result("f0", 0, None));
        let json = serde_json::to_value(aggregator.report()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"tasks": {"f0:0:1": {"shard_index": 0, "task_id": "f0"}}})
        );
    }

    #[tokio::test]
    async fn write_creates_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");

        let mut aggregator = ResultAggregator::new();
        aggregator.merge(&result("f0", 0, Some("task-f0")));
        aggregator.write(&path).await.unwrap();

        let written: Report =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(&written, aggregator.report());
        assert_eq!(written.entry_for_shard(0).unwrap().task_id, "f0");
    }
}
