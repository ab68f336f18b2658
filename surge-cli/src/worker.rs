// surge-cli/src/worker.rs
// Child-process side of the process worker pool

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use surge_core::{run_worker, TensorKernel, WorkResult, WorkerTask};

pub fn command() -> Command {
    Command::new("worker")
        .about("Run a single worker and print its timing as JSON (used by the process pool)")
        .hide(true)
        .arg(
            Arg::new("size")
                .long("size")
                .required(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("iterations")
                .long("iterations")
                .required(true)
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("copies")
                .long("copies")
                .default_value("0")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("memory-phase")
                .long("memory-phase")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-multiply")
                .long("no-multiply")
                .action(ArgAction::SetTrue),
        )
}

pub fn task_from(matches: &ArgMatches) -> Result<WorkerTask> {
    let get = |name: &str| {
        matches
            .get_one::<usize>(name)
            .copied()
            .with_context(|| format!("missing --{}", name))
    };

    Ok(WorkerTask {
        size: get("size")?,
        iterations: get("iterations")?,
        copies: get("copies")?,
        use_memory_phase: matches.get_flag("memory-phase"),
    })
}

/// Runs the task and writes exactly one JSON line to stdout
pub fn run(matches: &ArgMatches) -> Result<()> {
    let task = task_from(matches)?;
    let kernel = TensorKernel::new(!matches.get_flag("no-multiply"));
    let result: WorkResult = run_worker(&kernel, &task);

    let line = serde_json::to_string(&result).context("Cannot encode worker result")?;
    println!("{}", line);
    Ok(())
}
