// surge-core/src/workload.rs
// Single-worker units of work built on the numeric kernel

use crate::kernel::NumericKernel;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters handed by value to every worker of a dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTask {
    pub size: usize,
    pub iterations: usize,
    pub copies: usize,
    pub use_memory_phase: bool,
}

impl WorkerTask {
    /// Command-line form understood by the `worker` subcommand
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--size".to_string(),
            self.size.to_string(),
            "--iterations".to_string(),
            self.iterations.to_string(),
            "--copies".to_string(),
            self.copies.to_string(),
        ];
        if self.use_memory_phase {
            args.push("--memory-phase".to_string());
        }
        args
    }
}

/// Timing produced by one leaf invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkResult {
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub memory_phase_seconds: f64,
    #[serde(default)]
    pub cpu_phase_seconds: f64,
}

pub fn cpu_bound_run(kernel: &dyn NumericKernel, size: usize, iterations: usize) -> WorkResult {
    let seconds = kernel.transform(size, iterations).as_secs_f64();
    WorkResult {
        elapsed_seconds: seconds,
        cpu_phase_seconds: seconds,
        ..WorkResult::default()
    }
}

pub fn memory_copy_run(kernel: &dyn NumericKernel, size: usize, copies: usize) -> WorkResult {
    let seconds = kernel.clone_buffers(size, copies).as_secs_f64();
    WorkResult {
        elapsed_seconds: seconds,
        memory_phase_seconds: seconds,
        ..WorkResult::default()
    }
}

/// Body of one worker: optional memory phase, then the CPU phase
pub fn run_worker(kernel: &dyn NumericKernel, task: &WorkerTask) -> WorkResult {
    let memory_phase_seconds = if task.use_memory_phase {
        memory_copy_run(kernel, task.size, task.copies).elapsed_seconds
    } else {
        0.0
    };
    let cpu_phase_seconds = cpu_bound_run(kernel, task.size, task.iterations).elapsed_seconds;

    debug!(
        "Worker finished: size={}, memory={:.4}s, cpu={:.4}s",
        task.size, memory_phase_seconds, cpu_phase_seconds
    );

    WorkResult {
        elapsed_seconds: memory_phase_seconds + cpu_phase_seconds,
        memory_phase_seconds,
        cpu_phase_seconds,
    }
}
