// surge-core/src/pool.rs
// Worker pools: spawn N identical workers, block until all of them finish

use crate::error::{Result, SurgeError};
use crate::kernel::NumericKernel;
use crate::workload::{run_worker, WorkResult, WorkerTask};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, error};

/// Fan-out/fan-in over independent workers. Workers share no mutable
/// state and there is no timeout: one slow worker holds up the whole call.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    fn kind(&self) -> PoolKind;

    /// Run `task` on `workers` workers and return one result per worker, in
    /// worker order. Any failing worker fails the whole call.
    async fn run_all(&self, task: &WorkerTask, workers: usize) -> Result<Vec<WorkResult>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    /// One OS process per worker
    #[default]
    Process,
    /// One blocking thread per worker
    Thread,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Process => write!(f, "process"),
            PoolKind::Thread => write!(f, "thread"),
        }
    }
}

impl FromStr for PoolKind {
    type Err = SurgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "process" => Ok(PoolKind::Process),
            "thread" => Ok(PoolKind::Thread),
            other => Err(SurgeError::config(
                "pool",
                format!("unknown pool kind '{}', expected 'process' or 'thread'", other),
            )),
        }
    }
}

/// Runs each worker on tokio's blocking thread pool
pub struct ThreadWorkerPool {
    kernel: Arc<dyn NumericKernel>,
}

impl ThreadWorkerPool {
    pub fn new(kernel: Arc<dyn NumericKernel>) -> Self {
        Self { kernel }
    }
}

#[async_trait]
impl WorkerPool for ThreadWorkerPool {
    fn kind(&self) -> PoolKind {
        PoolKind::Thread
    }

    async fn run_all(&self, task: &WorkerTask, workers: usize) -> Result<Vec<WorkResult>> {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let kernel = Arc::clone(&self.kernel);
                let task = task.clone();
                tokio::task::spawn_blocking(move || run_worker(kernel.as_ref(), &task))
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        joined
            .into_iter()
            .enumerate()
            .map(|(worker, outcome)| {
                outcome.map_err(|e| {
                    error!("Worker thread {} terminated abnormally: {}", worker, e);
                    SurgeError::worker(worker, e.to_string())
                })
            })
            .collect()
    }
}

/// Re-executes a worker program once per worker. Each child receives the
/// task as arguments and prints a single JSON [`WorkResult`] on stdout.
#[derive(Debug, Clone)]
pub struct ProcessWorkerPool {
    program: PathBuf,
    base_args: Vec<String>,
}

impl ProcessWorkerPool {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Workers run as `<current executable> worker <extra_args> <task args>`
    pub fn current_exe(extra_args: Vec<String>) -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| SurgeError::io("resolve current executable", e))?;
        let mut base_args = vec!["worker".to_string()];
        base_args.extend(extra_args);
        Ok(Self::new(program, base_args))
    }

    fn command(&self, task: &WorkerTask) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(task.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    async fn run_one(&self, worker: usize, task: &WorkerTask) -> Result<WorkResult> {
        let child = self.command(task).spawn().map_err(|e| {
            error!("Failed to spawn worker {}: {}", worker, e);
            SurgeError::worker(worker, format!("spawn failed: {}", e))
        })?;
        debug!("Spawned worker {} (pid {:?})", worker, child.id());

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SurgeError::worker(worker, format!("wait failed: {}", e)))?;

        if !output.status.success() {
            error!("Worker {} exited with {}", worker, output.status);
            return Err(SurgeError::worker(worker, format!("exited with {}", output.status)));
        }

        parse_worker_output(worker, &output.stdout)
    }
}

/// The last non-empty stdout line carries the result
pub fn parse_worker_output(worker: usize, stdout: &[u8]) -> Result<WorkResult> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| SurgeError::worker(worker, "produced no output"))?;

    serde_json::from_str(line.trim())
        .map_err(|e| SurgeError::worker(worker, format!("unreadable result '{}': {}", line, e)))
}

#[async_trait]
impl WorkerPool for ProcessWorkerPool {
    fn kind(&self) -> PoolKind {
        PoolKind::Process
    }

    async fn run_all(&self, task: &WorkerTask, workers: usize) -> Result<Vec<WorkResult>> {
        let runs = (0..workers).map(|worker| self.run_one(worker, task));
        futures::future::try_join_all(runs).await
    }
}
