use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::Dialect;
use crate::error::{Result, TriggerError};

/// Task id and optional result-store invocation pulled from a trigger dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredTask {
    pub task_id: String,
    pub invocation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoDump {
    #[serde(default)]
    tasks: Vec<GoTask>,
}

#[derive(Debug, Deserialize)]
struct GoTask {
    request: GoTaskRequest,
    #[serde(default)]
    task_result: Option<GoTaskResult>,
}

#[derive(Debug, Deserialize)]
struct GoTaskRequest {
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct GoTaskResult {
    #[serde(default)]
    resultdb_info: Option<ResultDbInfo>,
}

#[derive(Debug, Deserialize)]
struct ResultDbInfo {
    #[serde(default)]
    invocation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyDump {
    #[serde(default)]
    tasks: BTreeMap<String, LegacyTask>,
}

#[derive(Debug, Deserialize)]
struct LegacyTask {
    task_id: String,
}

/// Extract the single triggered task from a client dump document.
pub fn parse_trigger_dump(dump: serde_json::Value, dialect: Dialect) -> Result<TriggeredTask> {
    let task = match dialect {
        Dialect::Go => {
            let parsed: GoDump = serde_json::from_value(dump).map_err(malformed)?;
            parsed.tasks.into_iter().next().map(|task| TriggeredTask {
                task_id: task.request.task_id,
                invocation: task
                    .task_result
                    .and_then(|r| r.resultdb_info)
                    .and_then(|info| info.invocation)
                    .filter(|inv| !inv.is_empty()),
            })
        }
        Dialect::Legacy => {
            let parsed: LegacyDump = serde_json::from_value(dump).map_err(malformed)?;
            parsed
                .tasks
                .into_values()
                .next()
                .map(|task| TriggeredTask {
                    task_id: task.task_id,
                    invocation: None,
                })
        }
    };

    task.ok_or_else(|| TriggerError::ServiceQuery("trigger dump lists no tasks".to_string()))
}

fn malformed(e: serde_json::Error) -> TriggerError {
    TriggerError::ServiceQuery(format!("unparsable trigger dump: {}", e))
}
