use thiserror::Error;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Task queue query failed: {0}")]
    ServiceQuery(String),

    #[error("Malformed trigger arguments: {0}")]
    MalformedArguments(String),

    #[error(
        "Not enough available machines exist in the pool: \
         {requested} shard(s) requested, {available} bot(s) eligible"
    )]
    InsufficientCapacity { requested: usize, available: usize },

    #[error("Trigger failed for shard {shard_index}: {reason}")]
    TriggerFailed { shard_index: usize, reason: String },

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TriggerError>;
