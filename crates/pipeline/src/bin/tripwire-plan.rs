//! tripwire-plan: compile and run an anomaly detection plan.
//!
//! # Usage
//!
//! ```bash
//! # Print the execution order without running anything
//! tripwire-plan --plan demos/pageviews.plan.toml --config demos/tripwire.toml \
//!     --start 2024-01-01T00:00:00Z --end 2024-01-02T00:00:00Z --dry-run
//!
//! # Run with level-parallel execution
//! tripwire-plan --plan demos/pageviews.plan.toml --config demos/tripwire.toml \
//!     --start 1704067200000 --end 1704153600000 --parallel --pretty
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use tripwire_core::{Config, DetectionInterval};
use tripwire_pipeline::{ExecutorConfig, Plan, PlanExecutor, Results, RunReport};

/// Compile and execute an anomaly detection plan.
#[derive(Parser, Debug)]
#[command(name = "tripwire-plan", version, about)]
struct Cli {
    /// Plan file (.json, anything else is read as TOML).
    #[arg(long)]
    plan: PathBuf,

    /// Executor config declaring datasources (TOML).
    #[arg(long, env = "TRIPWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Detection interval start: RFC 3339 or epoch millis.
    #[arg(long)]
    start: String,

    /// Detection interval end (exclusive): RFC 3339 or epoch millis.
    #[arg(long)]
    end: String,

    /// Compile only and print the execution order.
    #[arg(long)]
    dry_run: bool,

    /// Run independent nodes concurrently.
    #[arg(long)]
    parallel: bool,

    /// Thread pool size for --parallel (0 = one per core).
    #[arg(long)]
    max_parallelism: Option<usize>,

    /// Fail fetches whose macros cannot be expanded cleanly.
    #[arg(long)]
    strict_macros: bool,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct DryRun<'a> {
    order: Vec<&'a str>,
    levels: Vec<Vec<&'a str>>,
}

#[derive(Serialize)]
struct RunOutput<'a> {
    report: &'a RunReport,
    results: &'a Results,
}

fn parse_instant(raw: &str) -> anyhow::Result<i64> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("'{raw}' is neither epoch millis nor RFC 3339"))?;
    Ok(parsed.with_timezone(&Utc).timestamp_millis())
}

fn load_config(cli: &Cli, env: &Config) -> anyhow::Result<(ExecutorConfig, PathBuf)> {
    let (mut config, base_dir) = match &cli.config {
        Some(path) => {
            let config = ExecutorConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (config, base)
        }
        None => (ExecutorConfig::from_engine(&env.engine), PathBuf::new()),
    };
    if cli.parallel {
        config.executor.parallel = true;
    }
    if let Some(n) = cli.max_parallelism {
        config.executor.max_parallelism = n;
    }
    if cli.strict_macros {
        config.sql.strict_macros = true;
    }
    Ok((config, base_dir))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tripwire_core::config::load_dotenv();
    let env = Config::from_env();
    env.log_summary();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting tripwire-plan");

    let start = parse_instant(&cli.start)?;
    let end = parse_instant(&cli.end)?;
    if end <= start {
        bail!("--end must be after --start");
    }
    let interval = DetectionInterval::new(start, end)?;

    let (config, base_dir) = load_config(&cli, &env)?;
    let run = config
        .build_run_context(&base_dir)
        .context("building datasources")?;

    let plan = Plan::from_file(&cli.plan)
        .with_context(|| format!("reading plan {}", cli.plan.display()))?;
    let mut executor = PlanExecutor::compile(plan.nodes, interval, Arc::new(run))
        .context("compiling plan")?
        .with_settings(config.execution_settings());

    if cli.dry_run {
        return print_json(
            &DryRun {
                order: executor.order(),
                levels: executor.levels(),
            },
            cli.pretty,
        );
    }

    let outcome = executor.execute().map(|results| results.len());
    let output = RunOutput {
        report: executor.report(),
        results: executor.results(),
    };
    print_json(&output, cli.pretty)?;
    match outcome {
        Ok(count) => {
            tracing::info!(results = count, "plan finished");
            Ok(())
        }
        Err(err) => Err(err).context("executing plan"),
    }
}
