use std::process::Stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::config::SwarmingCliConfig;
use crate::error::{Result, TriggerError};
use crate::service::{BotListResponse, Dimension, TaskListResponse, TaskQueueService};

/// Talks to Swarming through its command-line client.
///
/// Every invocation writes its result to a fresh temporary JSON file which is
/// read back and parsed once the process exits. A client still running when
/// the cancellation token fires is killed.
#[derive(Debug, Clone)]
pub struct SwarmingCli {
    config: SwarmingCliConfig,
    host: String,
    cancel: CancellationToken,
}

impl SwarmingCli {
    /// `server` may carry a scheme; queries take the bare host.
    pub fn new(config: SwarmingCliConfig, server: &str) -> Self {
        Self {
            config,
            host: query_host(server).to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn query<T: DeserializeOwned + Default>(&self, endpoint: String) -> Result<T> {
        let out = NamedTempFile::new()?;
        let out_path = out.path().to_string_lossy().to_string();
        let args = vec![
            "query".to_string(),
            "-S".to_string(),
            self.host.clone(),
            "--json".to_string(),
            out_path,
            endpoint,
        ];
        self.run(&args).await?;
        let raw = tokio::fs::read(out.path()).await?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&raw)
            .map_err(|e| TriggerError::ServiceQuery(format!("unparsable query output: {}", e)))
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        tracing::debug!(binary = %self.config.binary.display(), ?args, "Running swarming client");

        let mut command = Command::new(&self.config.binary);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::warn!(?args, "Cancelled, killing swarming client");
                return Err(TriggerError::Cancelled(format!(
                    "{} killed before it finished",
                    self.config.binary.display()
                )));
            }
            output = command.output() => output,
        };
        let output = output.map_err(|e| {
            TriggerError::ServiceQuery(format!(
                "failed to run {}: {}",
                self.config.binary.display(),
                e
            ))
        })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(TriggerError::ServiceQuery(if stderr.trim().is_empty() {
            format!("swarming client exited with {:?}", output.status.code())
        } else {
            stderr.trim().to_string()
        }))
    }
}

#[async_trait]
impl TaskQueueService for SwarmingCli {
    async fn list_bots(&self, dimensions: &[Dimension]) -> Result<BotListResponse> {
        self.query(bots_endpoint(dimensions)).await
    }

    async fn list_tasks(&self, tags: &[String], limit: usize) -> Result<TaskListResponse> {
        self.query(tasks_endpoint(tags, limit)).await
    }

    async fn trigger(&self, args: &[String]) -> Result<serde_json::Value> {
        let dump = NamedTempFile::new()?;
        let mut full_args = args.to_vec();
        full_args.push("--dump-json".to_string());
        full_args.push(dump.path().to_string_lossy().to_string());
        self.run(&full_args).await?;

        let raw = tokio::fs::read(dump.path()).await?;
        serde_json::from_slice(&raw)
            .map_err(|e| TriggerError::ServiceQuery(format!("unparsable trigger output: {}", e)))
    }
}

fn query_host(server: &str) -> &str {
    server
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
}

fn bots_endpoint(dimensions: &[Dimension]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::from("bots/list?"));
    for dimension in dimensions {
        query.append_pair("dimensions", &dimension.as_tag());
    }
    query.finish()
}

fn tasks_endpoint(tags: &[String], limit: usize) -> String {
    let mut query = form_urlencoded::Serializer::new(String::from("tasks/list?"));
    for tag in tags {
        query.append_pair("tags", tag);
    }
    query.append_pair("limit", &limit.to_string());
    query.finish()
}
