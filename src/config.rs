use std::path::PathBuf;
use std::time::Duration;

/// Argument encoding understood by the Swarming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// `swarming.py` style: `--swarming host`, `--dimension key value`.
    Legacy,
    /// Go client style: `--server host`, `--dimension key=value`.
    #[default]
    Go,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Legacy => write!(f, "legacy"),
            Dialect::Go => write!(f, "go"),
        }
    }
}

/// How many shards a run has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardingMode {
    /// Fixed shard count with bot affinity across runs.
    Static { shard_count: usize },
    /// One shard per eligible bot; no affinity.
    Dynamic,
}

impl Default for ShardingMode {
    fn default() -> Self {
        ShardingMode::Static { shard_count: 1 }
    }
}

/// Location of the Swarming command-line client.
#[derive(Debug, Clone)]
pub struct SwarmingCliConfig {
    /// Path or name of the client executable, resolved through `PATH`.
    pub binary: PathBuf,
}

impl Default for SwarmingCliConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("swarming"),
        }
    }
}

/// Settings for one trigger run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Fixed shard count with affinity, or one shard per eligible bot.
    pub sharding: ShardingMode,
    /// Trigger only this shard (the full assignment is still planned).
    pub shard_index: Option<usize>,
    /// Argument encoding used to parse the input and invoke the client.
    pub dialect: Dialect,
    /// Where the merged report is written.
    pub dump_json: PathBuf,
    /// Upper bound on triggers in flight at once.
    pub max_concurrent_triggers: usize,
    /// Deadline for the whole run. Once it passes no new trigger starts and
    /// running client processes are killed.
    pub timeout: Option<Duration>,
    /// Log the previous and planned bot of every shard.
    pub verbose: bool,
    /// Client used to reach the task queue.
    pub swarming: SwarmingCliConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            sharding: ShardingMode::default(),
            shard_index: None,
            dialect: Dialect::default(),
            dump_json: PathBuf::from("output.json"),
            max_concurrent_triggers: 1,
            timeout: None,
            verbose: false,
            swarming: SwarmingCliConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn new(sharding: ShardingMode, dump_json: impl Into<PathBuf>) -> Self {
        Self {
            sharding,
            dump_json: dump_json.into(),
            ..Default::default()
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_shard_index(mut self, shard_index: usize) -> Self {
        self.shard_index = Some(shard_index);
        self
    }

    pub fn with_max_concurrent_triggers(mut self, n: usize) -> Self {
        self.max_concurrent_triggers = n.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
