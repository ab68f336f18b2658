// surge-core/src/lib.rs
// Adaptive parallel CPU and memory stress-test orchestrator

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod kernel;
pub mod observability;
pub mod policy;
pub mod pool;
pub mod probe;
pub mod recursive;
pub mod report;
pub mod scheduler;
pub mod workload;

#[cfg(test)]
mod tests;

pub use config::{ConfigValidator, HarnessConfig, RunConfig, ValidationReport, ValidationSeverity};
pub use dispatcher::{Dispatcher, ParallelOutcome};
pub use error::{ErrorCategory, Result, SurgeError};
pub use kernel::{NumericKernel, TensorKernel};
pub use observability::{HarnessMetrics, MetricsSnapshot};
pub use policy::{SizeDecision, SizingConfig, SizingPolicy};
pub use pool::{PoolKind, ProcessWorkerPool, ThreadWorkerPool, WorkerPool};
pub use probe::{FixedMemoryProbe, MemoryProbe, ScriptedMemoryProbe, SystemMemoryProbe};
pub use recursive::{RecursionConfig, RecursionStrategy, RecursiveDriver, RecursiveOutcome};
pub use report::{JsonFileSink, MemorySink, ResultSet, ResultSink, RoundRecord, RoundResults};
pub use scheduler::RoundScheduler;
pub use workload::{cpu_bound_run, memory_copy_run, run_worker, WorkResult, WorkerTask};
