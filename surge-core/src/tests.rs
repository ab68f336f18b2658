#[cfg(test)]
mod tests {
    use crate::config::HarnessConfig;
    use crate::dispatcher::Dispatcher;
    use crate::error::{Result, SurgeError};
    use crate::kernel::NumericKernel;
    use crate::policy::{SizeDecision, SizingConfig, SizingPolicy};
    use crate::pool::{PoolKind, ThreadWorkerPool, WorkerPool};
    use crate::probe::{FixedMemoryProbe, MemoryProbe, ScriptedMemoryProbe};
    use crate::recursive::{RecursionConfig, RecursionStrategy, RecursiveDriver};
    use crate::report::{MemorySink, ResultSet, ResultSink, MULTIPROCESSING_TEST, RECURSION_TEST};
    use crate::scheduler::RoundScheduler;
    use crate::workload::{WorkResult, WorkerTask};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Returns instantly and counts how often it was asked to work
    #[derive(Default)]
    struct NoopKernel {
        transforms: AtomicUsize,
        clones: AtomicUsize,
    }

    impl NumericKernel for NoopKernel {
        fn transform(&self, _size: usize, _iterations: usize) -> Duration {
            self.transforms.fetch_add(1, Ordering::SeqCst);
            Duration::ZERO
        }

        fn clone_buffers(&self, _size: usize, _copies: usize) -> Duration {
            self.clones.fetch_add(1, Ordering::SeqCst);
            Duration::ZERO
        }
    }

    /// Blocks the calling thread for a fixed time per transform
    struct SleepingKernel(Duration);

    impl NumericKernel for SleepingKernel {
        fn transform(&self, _size: usize, _iterations: usize) -> Duration {
            std::thread::sleep(self.0);
            self.0
        }

        fn clone_buffers(&self, _size: usize, _copies: usize) -> Duration {
            Duration::ZERO
        }
    }

    struct FailingPool;

    #[async_trait]
    impl WorkerPool for FailingPool {
        fn kind(&self) -> PoolKind {
            PoolKind::Process
        }

        async fn run_all(&self, _task: &WorkerTask, _workers: usize) -> Result<Vec<WorkResult>> {
            Err(SurgeError::worker(1, "exited with exit status: 137"))
        }
    }

    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn persist(&self, _results: &ResultSet) -> Result<()> {
            Err(SurgeError::io(
                "write results",
                std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            ))
        }
    }

    /// 4 workers, no pauses, default derivation
    fn create_test_config() -> HarnessConfig {
        HarnessConfig {
            worker_count: 4,
            ..HarnessConfig::default()
        }
        .without_pauses()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    fn policy(available_mb: f64) -> SizingPolicy {
        SizingPolicy::new(Arc::new(FixedMemoryProbe(available_mb)), SizingConfig::default())
    }

    fn scheduler_with(
        config: HarnessConfig,
        kernel: Arc<NoopKernel>,
        probe: Arc<dyn MemoryProbe>,
    ) -> RoundScheduler {
        let pool = Arc::new(ThreadWorkerPool::new(kernel.clone()));
        RoundScheduler::new(config, kernel, probe, pool).unwrap()
    }

    #[test]
    fn test_scenario_a_plenty_of_memory() {
        assert_eq!(policy(10_000.0).adjust(128, 500.0).as_pair(), (128, false));
    }

    #[test]
    fn test_scenario_b_shrink_without_abort() {
        assert_eq!(policy(100.0).adjust(128, 500.0).as_pair(), (102, false));
    }

    #[tokio::test]
    async fn test_scenario_c_abort_zeroes_dispatch_and_recursion() {
        let decision = policy(100.0).adjust(16, 500.0);
        assert_eq!(decision.as_pair(), (12, true));

        let kernel = Arc::new(NoopKernel::default());
        let dispatcher = Dispatcher::new(
            Arc::new(ThreadWorkerPool::new(kernel.clone())),
            policy(100.0),
        );
        let mut run = create_test_config().run_config_for(1.0);
        run.size = 16;

        let outcome = dispatcher.run_parallel(&run).await.unwrap();
        assert_eq!(outcome.total_elapsed_seconds, 0.0);

        let driver =
            RecursiveDriver::new(kernel.clone(), policy(100.0), RecursionConfig::default(), 1);
        assert_eq!(driver.run_recursive(16, 10, 500.0).elapsed_seconds, 0.0);
        assert_eq!(kernel.transforms.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_d_round_produces_two_ordered_records() {
        init_tracing();
        let kernel = Arc::new(NoopKernel::default());
        let scheduler = scheduler_with(
            create_test_config(),
            kernel.clone(),
            Arc::new(FixedMemoryProbe(10_000.0)),
        );

        let records = scheduler.run_round(1.0).await.unwrap();

        let names: Vec<_> = records.iter().map(|r| r.test.as_str()).collect();
        assert_eq!(names, vec!["multiprocessing CPU with memory", "recursive CPU"]);
        assert!(records.iter().all(|r| r.time >= 0.0 && !r.skipped));

        let mp = &records[0];
        assert_eq!(mp.parameters["size"], json!(128));
        assert_eq!(mp.parameters["num_processes"], json!(4));
        assert_eq!(mp.parameters["iterations"], json!(1000));
        assert_eq!(mp.parameters["num_copies"], json!(1000));

        let rec = &records[1];
        assert_eq!(rec.parameters["depth"], json!(10));
        assert_eq!(rec.parameters["units_run"], json!(11));

        // 4 workers with a memory phase each, plus depth + 1 recursion units
        assert_eq!(kernel.clones.load(Ordering::SeqCst), 4);
        assert_eq!(kernel.transforms.load(Ordering::SeqCst), 4 + 11);
    }

    #[test]
    fn test_dispatch_sums_worker_times() {
        let kernel = Arc::new(NoopKernel::default());
        let dispatcher = Dispatcher::new(
            Arc::new(ThreadWorkerPool::new(kernel.clone())),
            policy(10_000.0),
        );
        let run = create_test_config().run_config_for(2.0);

        let outcome = tokio_test::block_on(dispatcher.run_parallel(&run)).unwrap();

        assert_eq!(outcome.worker_seconds.len(), 4);
        assert_eq!(outcome.effective_size, 256);
        assert!(!outcome.skipped);
        let sum: f64 = outcome.worker_seconds.iter().sum();
        assert!((outcome.total_elapsed_seconds - sum).abs() < 1e-9);
        assert_eq!(kernel.transforms.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_parallel_record_time_is_wall_clock_not_worker_sum() {
        let kernel = Arc::new(SleepingKernel(Duration::from_millis(100)));
        let config = HarnessConfig {
            base_depth: 1,
            ..create_test_config()
        };
        let scheduler = RoundScheduler::new(
            config,
            kernel.clone(),
            Arc::new(FixedMemoryProbe(10_000.0)),
            Arc::new(ThreadWorkerPool::new(kernel)),
        )
        .unwrap();

        let records = scheduler.run_round(1.0).await.unwrap();
        let mp = &records[0];

        let summed = mp.parameters["total_worker_time"].as_f64().unwrap();
        assert!((summed - 0.4).abs() < 1e-6, "summed worker time {}", summed);
        // 4 workers sleep side by side, so the dispatch takes about one sleep
        assert!(mp.time >= 0.1, "wall time {}", mp.time);
        assert!(mp.time < summed * 0.75, "wall time {} vs summed {}", mp.time, summed);

        // 2 recursion levels at 100 ms each
        assert!((records[1].time - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_recursion_runs_depth_plus_one_units() {
        for strategy in [RecursionStrategy::Recursive, RecursionStrategy::Iterative] {
            for depth in [0usize, 1, 7, 40] {
                let kernel = Arc::new(NoopKernel::default());
                let driver = RecursiveDriver::new(
                    kernel.clone(),
                    policy(10_000.0),
                    RecursionConfig {
                        strategy,
                        ..RecursionConfig::default()
                    },
                    1,
                );

                let outcome = driver.run_recursive(128, depth, 500.0);
                assert_eq!(outcome.units_run, depth + 1);
                assert_eq!(kernel.transforms.load(Ordering::SeqCst), depth + 1);
            }
        }
    }

    #[tokio::test]
    async fn test_run_all_persists_once_in_ascending_order() {
        let config = HarnessConfig {
            size_multipliers: vec![1.0, 2.0, 4.0],
            ..create_test_config()
        };
        let scheduler = scheduler_with(
            config,
            Arc::new(NoopKernel::default()),
            Arc::new(FixedMemoryProbe(10_000.0)),
        );
        let sink = MemorySink::new();

        let results = scheduler.run_all(&sink).await.unwrap();

        assert_eq!(sink.persist_count(), 1);
        assert_eq!(sink.last().as_ref(), Some(&results));

        let multipliers: Vec<f64> = results.rounds().iter().map(|r| r.size_multiplier).collect();
        assert_eq!(multipliers, vec![1.0, 2.0, 4.0]);

        let sizes: Vec<_> = results
            .rounds()
            .iter()
            .map(|r| r.results[0].parameters["size"].clone())
            .collect();
        assert_eq!(sizes, vec![json!(128), json!(256), json!(512)]);

        for round in results.rounds() {
            assert_eq!(round.results.len(), 2);
            assert_eq!(round.results[0].test, MULTIPROCESSING_TEST);
            assert_eq!(round.results[1].test, RECURSION_TEST);
        }
        assert_eq!(scheduler.metrics().snapshot().rounds_completed, 3);
    }

    #[tokio::test]
    async fn test_worker_failure_degrades_record_and_run_continues() {
        let kernel = Arc::new(NoopKernel::default());
        let config = HarnessConfig {
            size_multipliers: vec![1.0, 2.0],
            ..create_test_config()
        };
        let scheduler = RoundScheduler::new(
            config,
            kernel,
            Arc::new(FixedMemoryProbe(10_000.0)),
            Arc::new(FailingPool),
        )
        .unwrap();
        let sink = MemorySink::new();

        let results = scheduler.run_all(&sink).await.unwrap();

        assert_eq!(results.len(), 2);
        for round in results.rounds() {
            let mp = &round.results[0];
            assert!(mp.skipped);
            assert_eq!(mp.time, 0.0);
            assert!(mp.error.as_deref().unwrap_or_default().contains("exit status: 137"));

            let rec = &round.results[1];
            assert!(!rec.skipped);
            assert!(rec.error.is_none());
        }
        assert_eq!(scheduler.metrics().snapshot().worker_failures, 2);
        assert_eq!(sink.persist_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_pressure_marks_skipped_records() {
        let config = HarnessConfig {
            size_multipliers: vec![1.0],
            base_size: 16,
            ..create_test_config()
        };
        // dispatch aborts, recursion recovers
        let probe = Arc::new(ScriptedMemoryProbe::new([100.0, 10_000.0]));
        let scheduler = scheduler_with(config, Arc::new(NoopKernel::default()), probe);

        let records = scheduler.run_round(1.0).await.unwrap();

        assert!(records[0].skipped);
        assert_eq!(records[0].time, 0.0);
        assert_eq!(records[0].parameters["effective_size"], json!(12));
        assert!(!records[1].skipped);
        assert_eq!(scheduler.metrics().snapshot().workloads_skipped, 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_fatal() {
        let config = HarnessConfig {
            size_multipliers: vec![1.0],
            ..create_test_config()
        };
        let scheduler = scheduler_with(
            config,
            Arc::new(NoopKernel::default()),
            Arc::new(FixedMemoryProbe(10_000.0)),
        );

        let err = scheduler.run_all(&BrokenSink).await.unwrap_err();
        assert!(matches!(err, SurgeError::Io { .. }));
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = HarnessConfig {
            size_multipliers: vec![2.0, 1.0],
            ..create_test_config()
        };
        let kernel = Arc::new(NoopKernel::default());
        let result = RoundScheduler::new(
            config,
            kernel.clone(),
            Arc::new(FixedMemoryProbe(10_000.0)),
            Arc::new(ThreadWorkerPool::new(kernel)),
        );
        assert!(matches!(result, Err(SurgeError::Config { .. })));
    }

    proptest! {
        #[test]
        fn prop_policy_is_idempotent(
            available in 0.0f64..20_000.0,
            floor in 0.0f64..20_000.0,
            size in 1usize..4096,
        ) {
            let policy = policy(available);
            let first = policy.adjust(size, floor);
            let second = policy.adjust(size, floor);
            prop_assert_eq!(first, second);

            if let SizeDecision::Shrunk { to, .. } = first {
                prop_assert!(to >= 16 && to < size);
            }
        }
    }
}
