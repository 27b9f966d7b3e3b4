use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use affinity_trigger::config::{Dialect, RunConfig, ShardingMode, SwarmingCliConfig};
use affinity_trigger::runner::{RunOutcome, ShardRunner};
use affinity_trigger::service::SwarmingCli;
use affinity_trigger::shutdown::install_shutdown_handler;
use affinity_trigger::trigger::TriggerRequest;

#[derive(Parser, Debug)]
#[command(name = "affinity-trigger")]
#[command(version)]
#[command(about = "Trigger test shards on Swarming bots, keeping each shard on the bot it last ran on")]
struct Args {
    /// Number of shards to trigger
    #[arg(long, default_value = "1", conflicts_with = "use_dynamic_shards")]
    shards: usize,

    /// Use one shard per eligible bot instead of a fixed count
    #[arg(long)]
    use_dynamic_shards: bool,

    /// Trigger only this shard
    #[arg(long)]
    shard_index: Option<usize>,

    /// Argument dialect of the swarming client
    #[arg(long, default_value = "go")]
    dialect: DialectArg,

    /// Where to write the merged task report
    #[arg(long)]
    dump_json: PathBuf,

    /// Swarming client binary
    #[arg(long, default_value = "swarming")]
    swarming_binary: PathBuf,

    /// Maximum number of triggers in flight
    #[arg(long, default_value = "1")]
    max_concurrent_triggers: usize,

    /// Stop starting new triggers after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log every shard assignment
    #[arg(long, alias = "multiple-dimension-script-verbose")]
    verbose: bool,

    /// Print a JSON summary on stdout
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,

    /// Trigger arguments for the swarming client (after `--`)
    #[arg(last = true, required = true)]
    trigger_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    Legacy,
    Go,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Legacy => Dialect::Legacy,
            DialectArg::Go => Dialect::Go,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct ShardOutput {
    shard_index: usize,
    bot_id: Option<String>,
    task_id: Option<String>,
    status: &'static str,
}

#[derive(Serialize)]
struct RunOutput {
    run_id: String,
    shard_count: usize,
    shards: Vec<ShardOutput>,
    success: bool,
}

fn shard_outputs(outcome: &RunOutcome) -> Vec<ShardOutput> {
    outcome
        .assignment
        .iter()
        .filter_map(|(shard_index, bot_id)| {
            let status = if outcome.dispatch.triggered.contains(&shard_index) {
                "TRIGGERED"
            } else if outcome
                .dispatch
                .failures
                .iter()
                .any(|f| f.shard_index == shard_index)
            {
                "FAILED"
            } else if outcome.dispatch.skipped.contains(&shard_index) {
                "SKIPPED"
            } else {
                return None;
            };
            Some(ShardOutput {
                shard_index,
                bot_id: bot_id.map(str::to_string),
                task_id: outcome
                    .report
                    .entry_for_shard(shard_index)
                    .map(|e| e.task_id.clone()),
                status,
            })
        })
        .collect()
}

fn print_outcome(
    outcome: &RunOutcome,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let shards = shard_outputs(outcome);
    match format {
        OutputFormat::Json => {
            let output = RunOutput {
                run_id: outcome.run_id.to_string(),
                shard_count: outcome.assignment.shard_count(),
                shards,
                success: outcome.is_success(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("{:<8} {:<24} {:<24} STATUS", "SHARD", "BOT", "TASK ID");
            println!("{}", "-".repeat(68));
            for shard in &shards {
                println!(
                    "{:<8} {:<24} {:<24} {}",
                    shard.shard_index,
                    shard.bot_id.as_deref().unwrap_or("-"),
                    shard.task_id.as_deref().unwrap_or("-"),
                    shard.status
                );
            }
            for failure in &outcome.dispatch.failures {
                eprintln!("Shard {}: {}", failure.shard_index, failure.error);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let sharding = if args.use_dynamic_shards {
        ShardingMode::Dynamic
    } else {
        ShardingMode::Static {
            shard_count: args.shards,
        }
    };
    let mut config = RunConfig::new(sharding, args.dump_json)
        .with_dialect(args.dialect.into())
        .with_max_concurrent_triggers(args.max_concurrent_triggers);
    config.verbose = args.verbose;
    config.swarming = SwarmingCliConfig {
        binary: args.swarming_binary,
    };
    if let Some(i) = args.shard_index {
        config = config.with_shard_index(i);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }

    let request = TriggerRequest::parse(&args.trigger_args, config.dialect)?;
    let server = request
        .server()
        .ok_or("trigger arguments must name a swarming server")?;
    let cancel = install_shutdown_handler();
    let service =
        Arc::new(SwarmingCli::new(config.swarming.clone(), server).with_cancel(cancel.clone()));

    tracing::info!(
        sharding = ?config.sharding,
        dialect = %config.dialect,
        server = %service.host(),
        dump_json = %config.dump_json.display(),
        "Starting affinity-trigger"
    );

    let runner = ShardRunner::new(config, service);
    let outcome = runner.run(&args.trigger_args, cancel).await?;

    print_outcome(&outcome, &args.output)?;
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
