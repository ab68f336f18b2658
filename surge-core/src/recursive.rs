// surge-core/src/recursive.rs
// Single-threaded nested-call stress driver

use crate::kernel::NumericKernel;
use crate::policy::{SizeDecision, SizingPolicy};
use crate::workload::cpu_bound_run;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_NATIVE_DEPTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecursionStrategy {
    /// Real nested calls, one stack frame per level
    #[default]
    Recursive,
    /// Same level order driven from an explicit Vec
    Iterative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecursionConfig {
    pub strategy: RecursionStrategy,
    /// Deeper requests switch to the iterative variant
    pub max_native_depth: usize,
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self {
            strategy: RecursionStrategy::Recursive,
            max_native_depth: DEFAULT_MAX_NATIVE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecursiveOutcome {
    pub elapsed_seconds: f64,
    /// Kernel units that actually ran
    pub units_run: usize,
    /// Some level hit the memory floor and cut the descent short
    pub aborted: bool,
}

impl RecursiveOutcome {
    /// Nothing ran at all
    pub fn skipped(&self) -> bool {
        self.aborted && self.units_run == 0
    }
}

#[derive(Default)]
struct Descent {
    elapsed_seconds: f64,
    units_run: usize,
    aborted: bool,
}

impl From<Descent> for RecursiveOutcome {
    fn from(descent: Descent) -> Self {
        Self {
            elapsed_seconds: descent.elapsed_seconds,
            units_run: descent.units_run,
            aborted: descent.aborted,
        }
    }
}

/// Runs `depth + 1` kernel units, checking memory before every level. A
/// shrink at one level carries down to the levels below it; an abort
/// zeroes that level and everything deeper.
pub struct RecursiveDriver {
    kernel: Arc<dyn NumericKernel>,
    policy: SizingPolicy,
    config: RecursionConfig,
    iterations_per_level: usize,
}

impl RecursiveDriver {
    pub fn new(
        kernel: Arc<dyn NumericKernel>,
        policy: SizingPolicy,
        config: RecursionConfig,
        iterations_per_level: usize,
    ) -> Self {
        Self {
            kernel,
            policy,
            config,
            iterations_per_level,
        }
    }

    pub fn run_recursive(
        &self,
        size: usize,
        depth: usize,
        memory_floor_mb: f64,
    ) -> RecursiveOutcome {
        let strategy = match self.config.strategy {
            RecursionStrategy::Recursive if depth > self.config.max_native_depth => {
                warn!(
                    "Recursion depth {} exceeds native limit {}, using explicit stack",
                    depth, self.config.max_native_depth
                );
                RecursionStrategy::Iterative
            }
            strategy => strategy,
        };

        let mut descent = Descent::default();
        match strategy {
            RecursionStrategy::Recursive => {
                let elapsed = self.descend(size, depth, memory_floor_mb, &mut descent);
                descent.elapsed_seconds = elapsed;
            }
            RecursionStrategy::Iterative => self.unwind(size, depth, memory_floor_mb, &mut descent),
        }

        debug!(
            "Recursion finished: depth={}, units={}, aborted={}, elapsed={:.4}s",
            depth, descent.units_run, descent.aborted, descent.elapsed_seconds
        );
        descent.into()
    }

    fn unit(&self, size: usize, descent: &mut Descent) -> f64 {
        descent.units_run += 1;
        cpu_bound_run(self.kernel.as_ref(), size, self.iterations_per_level).elapsed_seconds
    }

    fn descend(&self, size: usize, depth: usize, floor: f64, descent: &mut Descent) -> f64 {
        let size = match self.policy.adjust(size, floor) {
            SizeDecision::Abort { .. } => {
                descent.aborted = true;
                return 0.0;
            }
            decision => decision.size().unwrap_or(size),
        };

        let deeper = if depth == 0 {
            0.0
        } else {
            self.descend(size, depth - 1, floor, descent)
        };
        deeper + self.unit(size, descent)
    }

    fn unwind(&self, size: usize, depth: usize, floor: f64, descent: &mut Descent) {
        let mut frames = Vec::with_capacity(depth + 1);
        let mut size = size;

        for _ in 0..=depth {
            match self.policy.adjust(size, floor) {
                SizeDecision::Abort { .. } => {
                    descent.aborted = true;
                    break;
                }
                decision => {
                    size = decision.size().unwrap_or(size);
                    frames.push(size);
                }
            }
        }

        while let Some(frame_size) = frames.pop() {
            let elapsed = self.unit(frame_size, descent);
            descent.elapsed_seconds += elapsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::SizingConfig;
    use crate::probe::{FixedMemoryProbe, MemoryProbe, ScriptedMemoryProbe};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SizeLoggingKernel {
        sizes: Mutex<Vec<usize>>,
    }

    impl NumericKernel for SizeLoggingKernel {
        fn transform(&self, size: usize, _iterations: usize) -> Duration {
            self.sizes.lock().push(size);
            Duration::from_millis(1)
        }

        fn clone_buffers(&self, _size: usize, _copies: usize) -> Duration {
            Duration::ZERO
        }
    }

    fn driver(
        kernel: Arc<SizeLoggingKernel>,
        probe: Arc<dyn MemoryProbe>,
        strategy: RecursionStrategy,
    ) -> RecursiveDriver {
        RecursiveDriver::new(
            kernel,
            SizingPolicy::new(probe, SizingConfig::default()),
            RecursionConfig {
                strategy,
                ..RecursionConfig::default()
            },
            1,
        )
    }

    #[test]
    fn test_depth_zero_runs_one_unit() {
        let kernel = Arc::new(SizeLoggingKernel::default());
        let probe = Arc::new(FixedMemoryProbe(10_000.0));
        let d = driver(kernel.clone(), probe, RecursionStrategy::Recursive);

        let outcome = d.run_recursive(128, 0, 500.0);
        assert_eq!(outcome.units_run, 1);
        assert!(!outcome.aborted);
        assert_eq!(kernel.sizes.lock().len(), 1);
    }

    #[test]
    fn test_both_strategies_agree_under_shrinking_memory() {
        for strategy in [RecursionStrategy::Recursive, RecursionStrategy::Iterative] {
            let kernel = Arc::new(SizeLoggingKernel::default());
            // level 0 fine, levels 1 and 2 shrink, level 3 fine
            let probe = Arc::new(ScriptedMemoryProbe::new([1000.0, 100.0, 100.0, 1000.0]));
            let d = driver(kernel.clone(), probe, strategy);

            let outcome = d.run_recursive(128, 3, 500.0);
            assert_eq!(outcome.units_run, 4, "{:?}", strategy);
            assert!(!outcome.aborted);
            // deepest level first
            assert_eq!(*kernel.sizes.lock(), vec![81, 81, 102, 128], "{:?}", strategy);
        }
    }

    #[test]
    fn test_abort_mid_descent_zeroes_deeper_levels() {
        for strategy in [RecursionStrategy::Recursive, RecursionStrategy::Iterative] {
            let kernel = Arc::new(SizeLoggingKernel::default());
            // 20 -> 16 at level 1, 16 -> 12 aborts at level 2
            let probe = Arc::new(ScriptedMemoryProbe::new([1000.0, 100.0, 100.0]));
            let d = driver(kernel.clone(), probe, strategy);

            let outcome = d.run_recursive(20, 5, 500.0);
            assert!(outcome.aborted);
            assert!(!outcome.skipped());
            assert_eq!(outcome.units_run, 2, "{:?}", strategy);
            assert_eq!(*kernel.sizes.lock(), vec![16, 20]);
        }
    }

    #[test]
    fn test_abort_at_top_skips_everything() {
        let kernel = Arc::new(SizeLoggingKernel::default());
        let probe = Arc::new(FixedMemoryProbe(100.0));
        let d = driver(kernel.clone(), probe, RecursionStrategy::Recursive);

        let outcome = d.run_recursive(16, 10, 500.0);
        assert_eq!(outcome.elapsed_seconds, 0.0);
        assert!(outcome.skipped());
        assert!(kernel.sizes.lock().is_empty());
    }

    #[test]
    fn test_deep_request_falls_back_to_explicit_stack() {
        let kernel = Arc::new(SizeLoggingKernel::default());
        let d = RecursiveDriver::new(
            kernel.clone(),
            SizingPolicy::new(Arc::new(FixedMemoryProbe(10_000.0)), SizingConfig::default()),
            RecursionConfig {
                strategy: RecursionStrategy::Recursive,
                max_native_depth: 8,
            },
            1,
        );

        let outcome = d.run_recursive(32, 50, 500.0);
        assert_eq!(outcome.units_run, 51);
        assert_eq!(kernel.sizes.lock().len(), 51);
    }
}
