// surge-core/src/config.rs
// Harness configuration, per-round parameter derivation and validation

use crate::error::{Result, SurgeError};
use crate::policy::SizingConfig;
use crate::recursive::RecursionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fraction of logical cores used for workers when nothing else is set
pub const DEFAULT_WORKER_FRACTION: f64 = 0.5;

/// Inputs of a whole run. Everything a round needs is derived from these
/// and the round's size multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Ascending multipliers, one round each
    pub size_multipliers: Vec<f64>,
    pub base_size: usize,
    pub base_iterations: usize,
    pub base_copies: usize,
    pub base_depth: usize,
    /// Kernel iterations per recursion level
    pub recursion_iterations: usize,
    pub worker_count: usize,
    pub use_memory_phase: bool,
    pub memory_floor_mb: f64,
    /// Include the matrix product in every kernel iteration
    pub multiply: bool,
    /// Idle time before each round starts
    pub warmup_pause_ms: u64,
    /// Idle time after each round
    pub round_pause_ms: u64,
    pub sizing: SizingConfig,
    pub recursion: RecursionConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            size_multipliers: vec![1.0, 2.0, 4.0, 8.0, 16.0],
            base_size: 128,
            base_iterations: 1000,
            base_copies: 1000,
            base_depth: 10,
            recursion_iterations: 1,
            worker_count: workers_for_fraction(available_cores(), DEFAULT_WORKER_FRACTION),
            use_memory_phase: true,
            memory_floor_mb: 500.0,
            multiply: true,
            warmup_pause_ms: 1000,
            round_pause_ms: 2000,
            sizing: SizingConfig::default(),
            recursion: RecursionConfig::default(),
        }
    }
}

/// Logical cores on this host
pub fn available_cores() -> usize {
    num_cpus::get()
}

/// Worker count for a share of `cores`, never below one
pub fn workers_for_fraction(cores: usize, fraction: f64) -> usize {
    ((cores as f64 * fraction).floor() as usize).max(1)
}

/// Parameters of one round, fixed once derived
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub size: usize,
    pub worker_count: usize,
    pub iterations_per_call: usize,
    pub copies_per_worker: usize,
    pub use_memory_phase: bool,
    pub memory_floor_mb: f64,
    pub recursion_depth: usize,
}

impl HarnessConfig {
    /// Larger multiplier: larger buffers, fewer iterations, more copies,
    /// deeper recursion.
    pub fn run_config_for(&self, size_multiplier: f64) -> RunConfig {
        let scale_up = |base: usize| (base as f64 * size_multiplier).floor() as usize;

        RunConfig {
            size: scale_up(self.base_size),
            worker_count: self.worker_count,
            iterations_per_call: ((self.base_iterations as f64 / size_multiplier).floor() as usize)
                .max(1),
            copies_per_worker: scale_up(self.base_copies),
            use_memory_phase: self.use_memory_phase,
            memory_floor_mb: self.memory_floor_mb,
            recursion_depth: scale_up(self.base_depth),
        }
    }

    pub fn warmup_pause(&self) -> Duration {
        Duration::from_millis(self.warmup_pause_ms)
    }

    pub fn round_pause(&self) -> Duration {
        Duration::from_millis(self.round_pause_ms)
    }

    /// Drop both pauses, used for dry runs and tests
    pub fn without_pauses(mut self) -> Self {
        self.warmup_pause_ms = 0;
        self.round_pause_ms = 0;
        self
    }

    /// Run the validator against the host's core count and fail on errors
    pub fn validate(&self) -> Result<ValidationReport> {
        let report = ConfigValidator::new(available_cores()).validate(self);
        report.log();
        report.into_result()
    }
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    Info,
    Warning,
    Error,
}

/// Individual validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub severity: ValidationSeverity,
    pub message: String,
}

/// Comprehensive validation report
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.iter().all(|i| i.severity < ValidationSeverity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity >= ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Warning)
    }

    pub fn log(&self) {
        for issue in &self.issues {
            match issue.severity {
                ValidationSeverity::Info => debug!("Config {}: {}", issue.field, issue.message),
                ValidationSeverity::Warning => warn!("Config {}: {}", issue.field, issue.message),
                ValidationSeverity::Error => {
                    warn!("Invalid config {}: {}", issue.field, issue.message)
                }
            }
        }
    }

    /// First error becomes a [`SurgeError::Config`]
    pub fn into_result(self) -> Result<Self> {
        if let Some(issue) = self.errors().next() {
            return Err(SurgeError::config(&issue.field, issue.message.clone()));
        }
        Ok(self)
    }

    fn push(&mut self, field: &str, severity: ValidationSeverity, message: String) {
        self.issues.push(ValidationIssue {
            field: field.to_string(),
            severity,
            message,
        });
    }
}

/// Checks a [`HarnessConfig`] against hard limits and the host's core count
pub struct ConfigValidator {
    cpu_cores: usize,
}

impl ConfigValidator {
    pub fn new(cpu_cores: usize) -> Self {
        Self { cpu_cores }
    }

    pub fn validate(&self, config: &HarnessConfig) -> ValidationReport {
        use ValidationSeverity::*;
        let mut report = ValidationReport::default();

        for (field, value) in [
            ("base_size", config.base_size),
            ("base_iterations", config.base_iterations),
            ("recursion_iterations", config.recursion_iterations),
            ("worker_count", config.worker_count),
        ] {
            if value == 0 {
                report.push(field, Error, "must be greater than zero".to_string());
            }
        }

        if !(config.memory_floor_mb >= 0.0) {
            report.push(
                "memory_floor_mb",
                Error,
                format!("must be a non-negative number, got {}", config.memory_floor_mb),
            );
        }

        let factor = config.sizing.shrink_factor;
        if !(factor > 0.0 && factor < 1.0) {
            report.push(
                "sizing.shrink_factor",
                Error,
                format!("must be strictly between 0 and 1, got {}", factor),
            );
        }

        if config.recursion.max_native_depth == 0 {
            report.push(
                "recursion.max_native_depth",
                Error,
                "must be greater than zero".to_string(),
            );
        }

        self.check_multipliers(config, &mut report);

        if config.worker_count > self.cpu_cores {
            report.push(
                "worker_count",
                Warning,
                format!(
                    "{} workers on {} cores will oversubscribe the CPU",
                    config.worker_count, self.cpu_cores
                ),
            );
        }

        info!("Configuration validated with {} issue(s)", report.issues.len());
        report
    }

    fn check_multipliers(&self, config: &HarnessConfig, report: &mut ValidationReport) {
        use ValidationSeverity::*;
        let multipliers = &config.size_multipliers;

        if multipliers.is_empty() {
            report.push(
                "size_multipliers",
                Error,
                "at least one multiplier is required".to_string(),
            );
            return;
        }

        if let Some(bad) = multipliers.iter().find(|m| !(m.is_finite() && **m > 0.0)) {
            report.push(
                "size_multipliers",
                Error,
                format!("multipliers must be positive, got {}", bad),
            );
            return;
        }

        if multipliers.windows(2).any(|pair| pair[0] >= pair[1]) {
            report.push(
                "size_multipliers",
                Error,
                format!("multipliers must be strictly ascending, got {:?}", multipliers),
            );
            return;
        }

        let derived: Vec<RunConfig> = multipliers
            .iter()
            .map(|m| config.run_config_for(*m))
            .collect();

        for (m, run) in multipliers.iter().zip(&derived) {
            if run.size == 0 {
                report.push(
                    "size_multipliers",
                    Error,
                    format!("multiplier {} derives a zero buffer size", m),
                );
            } else if run.size < config.sizing.min_size {
                report.push(
                    "size_multipliers",
                    Warning,
                    format!(
                        "multiplier {} derives size {} below the minimum {}, \
                         any shrink will skip the workload",
                        m, run.size, config.sizing.min_size
                    ),
                );
            }
        }

        for (pair, runs) in multipliers.windows(2).zip(derived.windows(2)) {
            if runs[0].iterations_per_call <= runs[1].iterations_per_call {
                report.push(
                    "size_multipliers",
                    Warning,
                    format!(
                        "iterations do not decrease between multipliers {} and {} ({} -> {})",
                        pair[0], pair[1], runs[0].iterations_per_call, runs[1].iterations_per_call
                    ),
                );
            }
        }

        if multipliers.len() > 1 {
            report.push(
                "size_multipliers",
                Info,
                format!("{} rounds scheduled", multipliers.len()),
            );
        }
    }
}
