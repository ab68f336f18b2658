// surge-cli/src/main.rs
// Surge - adaptive CPU and memory stress harness

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod worker;

use config::{Config, LogFormat, Overrides};
use surge_core::{
    JsonFileSink, NumericKernel, PoolKind, ProcessWorkerPool, RecursionStrategy, RoundScheduler,
    SystemMemoryProbe, TensorKernel, ThreadWorkerPool, WorkerPool,
};

fn cli() -> Command {
    Command::new("surge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Adaptive parallel CPU and memory stress test")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Configuration file path")
                .default_value("surge.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Where to write the JSON results"),
        )
        .arg(
            Arg::new("multipliers")
                .long("multipliers")
                .help("Comma-separated size multipliers, ascending")
                .value_delimiter(',')
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .help("Number of parallel workers")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("worker-fraction")
                .long("worker-fraction")
                .help("Workers as a share of logical cores")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("memory-floor")
                .long("memory-floor")
                .help("Available memory (MB) below which sizes shrink")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("pool")
                .long("pool")
                .help("Worker isolation")
                .value_parser(["process", "thread"]),
        )
        .arg(
            Arg::new("recursion")
                .long("recursion")
                .help("Nested-call driver")
                .value_parser(["recursive", "iterative"]),
        )
        .arg(
            Arg::new("no-memory-phase")
                .long("no-memory-phase")
                .help("Skip the buffer-copy phase in each worker")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-multiply")
                .long("no-multiply")
                .help("Skip the matrix self-multiply in the CPU kernel")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-pause")
                .long("no-pause")
                .help("Disable the warm-up and inter-round pauses")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_parser(["text", "json"]),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Print the derived round parameters and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(worker::command())
}

fn overrides_from(matches: &ArgMatches) -> Overrides {
    Overrides {
        output: matches.get_one::<String>("output").cloned(),
        multipliers: matches
            .get_many::<f64>("multipliers")
            .map(|values| values.copied().collect()),
        workers: matches.get_one::<usize>("workers").copied(),
        worker_fraction: matches.get_one::<f64>("worker-fraction").copied(),
        memory_floor_mb: matches.get_one::<f64>("memory-floor").copied(),
        pool: matches
            .get_one::<String>("pool")
            .and_then(|value| value.parse::<PoolKind>().ok()),
        recursion: matches
            .get_one::<String>("recursion")
            .map(|value| match value.as_str() {
                "iterative" => RecursionStrategy::Iterative,
                _ => RecursionStrategy::Recursive,
            }),
        no_memory_phase: matches.get_flag("no-memory-phase"),
        no_multiply: matches.get_flag("no-multiply"),
        no_pause: matches.get_flag("no-pause"),
        log_format: matches
            .get_one::<String>("log-format")
            .map(|value| match value.as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Text,
            }),
    }
}

/// Logs go to stderr so worker stdout stays a clean JSON channel
fn init_logging(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn set_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        error!(%location, "panic: {}", info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    if let Some(("worker", worker_matches)) = matches.subcommand() {
        init_logging(LogFormat::Text, "warn");
        return worker::run(worker_matches);
    }

    let config_path = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let (mut config, fallback) = Config::load(config_path);
    config.apply(overrides_from(&matches));

    init_logging(config.logging.format, &config.logging.level);
    set_panic_hook();

    info!("🚀 Surge stress harness v{}", env!("CARGO_PKG_VERSION"));
    if let Some(fallback) = fallback {
        fallback.warn();
    }

    if matches.get_flag("dry-run") {
        return dry_run(&config);
    }

    run(config).await
}

/// Validates like a real run would, then logs the derived rounds
fn dry_run(config: &Config) -> Result<()> {
    config
        .harness
        .validate()
        .context("Invalid harness configuration")?;
    print_plan(config);
    Ok(())
}

fn print_plan(config: &Config) {
    info!(
        pool = %config.pool,
        workers = config.harness.worker_count,
        memory_floor_mb = config.harness.memory_floor_mb,
        "📋 Planned rounds"
    );
    for &multiplier in &config.harness.size_multipliers {
        let run = config.harness.run_config_for(multiplier);
        info!(
            multiplier,
            size = run.size,
            iterations = run.iterations_per_call,
            copies = run.copies_per_worker,
            depth = run.recursion_depth,
            "round"
        );
    }
}

fn build_pool(config: &Config, kernel: Arc<dyn NumericKernel>) -> Result<Arc<dyn WorkerPool>> {
    let pool: Arc<dyn WorkerPool> = match config.pool {
        PoolKind::Thread => Arc::new(ThreadWorkerPool::new(kernel)),
        PoolKind::Process => {
            let mut extra_args = Vec::new();
            if !config.harness.multiply {
                extra_args.push("--no-multiply".to_string());
            }
            Arc::new(
                ProcessWorkerPool::current_exe(extra_args)
                    .context("Cannot set up process worker pool")?,
            )
        }
    };
    Ok(pool)
}

async fn run(config: Config) -> Result<()> {
    let kernel: Arc<dyn NumericKernel> = Arc::new(TensorKernel::new(config.harness.multiply));
    let probe = Arc::new(SystemMemoryProbe::new());
    let pool = build_pool(&config, kernel.clone())?;
    let sink = JsonFileSink::new(&config.output.path);

    info!(
        pool = %config.pool,
        workers = config.harness.worker_count,
        rounds = config.harness.size_multipliers.len(),
        "⚡ Starting stress rounds"
    );

    let scheduler = RoundScheduler::new(config.harness.clone(), kernel, probe, pool)
        .context("Invalid harness configuration")?;
    let results = scheduler.run_all(&sink).await?;

    let snapshot = scheduler.metrics().snapshot();
    info!(
        rounds = results.len(),
        shrinks = snapshot.size_shrinks,
        skipped = snapshot.workloads_skipped,
        worker_failures = snapshot.worker_failures,
        "📈 Run summary"
    );
    info!("✅ Results written to {}", sink.path().display());

    Ok(())
}
