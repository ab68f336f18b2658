// surge-core/src/dispatcher.rs
// Fan a round's workload out across the worker pool and fold the timings

use crate::config::RunConfig;
use crate::error::{Result, SurgeError};
use crate::policy::{SizeDecision, SizingPolicy};
use crate::pool::WorkerPool;
use crate::workload::WorkerTask;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a parallel dispatch produced
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelOutcome {
    /// Sum of every worker's own elapsed time
    pub total_elapsed_seconds: f64,
    pub worker_seconds: Vec<f64>,
    /// Size the workers actually ran with
    pub effective_size: usize,
    /// The sizing policy aborted and no worker was spawned
    pub skipped: bool,
}

impl ParallelOutcome {
    fn skipped(attempted: usize) -> Self {
        Self {
            total_elapsed_seconds: 0.0,
            worker_seconds: Vec::new(),
            effective_size: attempted,
            skipped: true,
        }
    }
}

pub struct Dispatcher {
    pool: Arc<dyn WorkerPool>,
    policy: SizingPolicy,
}

impl Dispatcher {
    pub fn new(pool: Arc<dyn WorkerPool>, policy: SizingPolicy) -> Self {
        Self { pool, policy }
    }

    /// One memory check for the whole pool, then `worker_count` identical
    /// workers. Blocks until every worker is done.
    #[instrument(skip(self, config), fields(size = config.size, workers = config.worker_count))]
    pub async fn run_parallel(&self, config: &RunConfig) -> Result<ParallelOutcome> {
        let size = match self.policy.adjust(config.size, config.memory_floor_mb) {
            SizeDecision::Abort { attempted } => {
                warn!("Skipping parallel workload, size {} is too small", attempted);
                return Ok(ParallelOutcome::skipped(attempted));
            }
            decision => decision.size().unwrap_or(config.size),
        };

        let task = WorkerTask {
            size,
            iterations: config.iterations_per_call,
            copies: config.copies_per_worker,
            use_memory_phase: config.use_memory_phase,
        };

        info!(
            "Dispatching {} {} workers with buffers of size ({}, {})",
            config.worker_count,
            self.pool.kind(),
            size,
            size
        );

        let results = self.pool.run_all(&task, config.worker_count).await?;
        if results.len() != config.worker_count {
            return Err(SurgeError::InvalidResult(format!(
                "expected {} worker results, got {}",
                config.worker_count,
                results.len()
            )));
        }

        let worker_seconds: Vec<f64> = results.iter().map(|r| r.elapsed_seconds).collect();
        for (worker, seconds) in worker_seconds.iter().enumerate() {
            debug!("Worker {} took {:.4}s", worker, seconds);
        }

        Ok(ParallelOutcome {
            total_elapsed_seconds: worker_seconds.iter().sum(),
            worker_seconds,
            effective_size: size,
            skipped: false,
        })
    }
}
