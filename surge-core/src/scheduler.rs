// surge-core/src/scheduler.rs
// Drives escalating size multipliers and assembles the result set

use crate::config::{HarnessConfig, RunConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SurgeError};
use crate::kernel::NumericKernel;
use crate::observability::HarnessMetrics;
use crate::policy::SizingPolicy;
use crate::pool::WorkerPool;
use crate::probe::MemoryProbe;
use crate::recursive::{RecursiveDriver, RecursiveOutcome};
use crate::report::{ResultSet, ResultSink, RoundRecord, MULTIPROCESSING_TEST, RECURSION_TEST};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument};

/// Runs one round per size multiplier, strictly in sequence. Within a
/// round the parallel test always finishes before the recursion test starts.
pub struct RoundScheduler {
    config: HarnessConfig,
    dispatcher: Dispatcher,
    recursive: Arc<RecursiveDriver>,
    metrics: Arc<HarnessMetrics>,
}

impl RoundScheduler {
    /// Validates `config` and wires the collaborators together
    pub fn new(
        config: HarnessConfig,
        kernel: Arc<dyn NumericKernel>,
        probe: Arc<dyn MemoryProbe>,
        pool: Arc<dyn WorkerPool>,
    ) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(HarnessMetrics::new());
        let policy = SizingPolicy::with_metrics(probe, config.sizing, Arc::clone(&metrics));
        let recursive = RecursiveDriver::new(
            kernel,
            policy.clone(),
            config.recursion,
            config.recursion_iterations,
        );

        Ok(Self {
            dispatcher: Dispatcher::new(pool, policy),
            recursive: Arc::new(recursive),
            metrics,
            config,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn metrics(&self) -> &HarnessMetrics {
        &self.metrics
    }

    pub fn derive_run_config(&self, size_multiplier: f64) -> RunConfig {
        self.config.run_config_for(size_multiplier)
    }

    /// Every multiplier in order, then a single hand-off to `sink`
    pub async fn run_all(&self, sink: &dyn ResultSink) -> Result<ResultSet> {
        let mut results = ResultSet::new();

        for &size_multiplier in &self.config.size_multipliers {
            info!("------------------------------------------------------------");
            info!("Running tests with size multiplier: {}", size_multiplier);

            let records = self.run_round(size_multiplier).await?;
            results.push(size_multiplier, records);

            pause(self.config.round_pause(), "before next multiplier").await;
        }

        sink.persist(&results)?;
        info!("CPU stress test complete, {} rounds recorded", results.len());
        Ok(results)
    }

    /// Parallel test, then recursion test; one record each, in that order
    #[instrument(skip(self))]
    pub async fn run_round(&self, size_multiplier: f64) -> Result<Vec<RoundRecord>> {
        let started = Instant::now();
        let run = self.derive_run_config(size_multiplier);

        pause(self.config.warmup_pause(), "before starting the test").await;

        let multiprocessing = self.multiprocessing_test(&run).await?;
        let recursion = self.recursion_test(&run).await?;

        self.metrics.record_round(size_multiplier, started.elapsed());
        Ok(vec![multiprocessing, recursion])
    }

    async fn multiprocessing_test(&self, run: &RunConfig) -> Result<RoundRecord> {
        info!("Testing multiprocessing CPU with buffers of size ({}, {})", run.size, run.size);
        let record = RoundRecord::new(MULTIPROCESSING_TEST)
            .param("size", run.size)
            .param("num_processes", run.worker_count)
            .param("iterations", run.iterations_per_call)
            .param("num_copies", run.copies_per_worker);

        let started = Instant::now();
        let outcome = match self.dispatcher.run_parallel(run).await {
            Ok(outcome) => outcome,
            Err(e) => return self.degrade(record, e),
        };
        let wall_seconds = started.elapsed().as_secs_f64();

        let record = record
            .param("effective_size", outcome.effective_size)
            .param("total_worker_time", outcome.total_elapsed_seconds);

        if outcome.skipped {
            self.metrics.record_skip(MULTIPROCESSING_TEST);
            return Ok(record.skipped());
        }

        info!(
            "Multiprocessing CPU operation took {:.4} seconds, {:.4} summed over all workers",
            wall_seconds, outcome.total_elapsed_seconds
        );
        Ok(record.timed(wall_seconds))
    }

    async fn recursion_test(&self, run: &RunConfig) -> Result<RoundRecord> {
        let record = RoundRecord::new(RECURSION_TEST)
            .param("size", run.size)
            .param("depth", run.recursion_depth);

        let driver = Arc::clone(&self.recursive);
        let (size, depth, floor) = (run.size, run.recursion_depth, run.memory_floor_mb);
        let joined =
            tokio::task::spawn_blocking(move || driver.run_recursive(size, depth, floor)).await;

        let outcome: RecursiveOutcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => return self.degrade(record, SurgeError::worker(0, e.to_string())),
        };

        let record = record.param("units_run", outcome.units_run);
        if outcome.skipped() {
            self.metrics.record_skip(RECURSION_TEST);
            return Ok(record.skipped());
        }

        info!(
            "Recursive CPU operation ran {} units in {:.4} seconds",
            outcome.units_run, outcome.elapsed_seconds
        );
        Ok(record.timed(outcome.elapsed_seconds))
    }

    /// Round-local failures become a zero-time record; anything else stops the run
    fn degrade(&self, record: RoundRecord, err: SurgeError) -> Result<RoundRecord> {
        if !err.is_round_local() {
            return Err(err);
        }
        error!("{} failed: {}", record.test, err);
        self.metrics.record_worker_failure();
        Ok(record.failed(&err))
    }
}

async fn pause(duration: Duration, reason: &str) {
    if duration.is_zero() {
        return;
    }
    info!("Sleeping for {:.1} seconds {}", duration.as_secs_f64(), reason);
    tokio::time::sleep(duration).await;
}
