//! Boundary to the task-queue service.
//!
//! The scheduler never talks to Swarming directly. Every call goes through
//! [`TaskQueueService`], which has three operations:
//!
//! - **list_bots**: bot status records matching a set of dimensions
//! - **list_tasks**: recent tasks carrying a set of tags
//! - **trigger**: submit one task from dialect-encoded arguments and return
//!   the client's JSON dump document
//!
//! [`SwarmingCli`] is the production implementation; it drives the Swarming
//! command-line client.

pub mod swarming;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use swarming::SwarmingCli;

/// A `key:value` constraint used to select bots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub key: String,
    pub value: String,
}

impl Dimension {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Tag form used when querying tasks (`key:value`).
    pub fn as_tag(&self) -> String {
        format!("{}:{}", self.key, self.value)
    }
}

/// One bot status record as reported by `bots/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotRecord {
    pub bot_id: String,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub quarantined: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotListResponse {
    #[serde(default)]
    pub items: Vec<BotRecord>,
}

/// One task record as reported by `tasks/list`.
///
/// Depending on the server version the executing bot is either a direct
/// field or only present as an `id:<value>` tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskRecord {
    pub fn executing_bot(&self) -> Option<&str> {
        if let Some(id) = self.bot_id.as_deref().filter(|id| !id.is_empty()) {
            return Some(id);
        }
        self.tags
            .iter()
            .find_map(|tag| tag.strip_prefix("id:"))
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskListResponse {
    #[serde(default)]
    pub items: Vec<TaskRecord>,
}

#[async_trait]
pub trait TaskQueueService: Send + Sync {
    /// List bot status records matching all `dimensions`.
    async fn list_bots(&self, dimensions: &[Dimension]) -> Result<BotListResponse>;

    /// List the most recent tasks carrying all `tags`, newest first.
    async fn list_tasks(&self, tags: &[String], limit: usize) -> Result<TaskListResponse>;

    /// Trigger one task. `args` are already encoded in the client's dialect.
    async fn trigger(&self, args: &[String]) -> Result<serde_json::Value>;
}
