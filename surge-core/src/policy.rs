// surge-core/src/policy.rs
// Shrink-on-low-memory sizing policy

use crate::observability::HarnessMetrics;
use crate::probe::MemoryProbe;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_SHRINK_FACTOR: f64 = 0.8;
pub const DEFAULT_MIN_SIZE: usize = 16;

/// Tunables for [`SizingPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub shrink_factor: f64,
    pub min_size: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            shrink_factor: DEFAULT_SHRINK_FACTOR,
            min_size: DEFAULT_MIN_SIZE,
        }
    }
}

/// Outcome of one memory check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDecision {
    /// Enough memory, keep the requested size
    Unchanged(usize),
    /// Below the floor, continue with a smaller buffer
    Shrunk { from: usize, to: usize },
    /// Below the floor and the shrunk size is too small to be meaningful
    Abort { attempted: usize },
}

impl SizeDecision {
    /// Size to run with, `None` when the workload must be skipped
    pub fn size(&self) -> Option<usize> {
        match *self {
            SizeDecision::Unchanged(size) => Some(size),
            SizeDecision::Shrunk { to, .. } => Some(to),
            SizeDecision::Abort { .. } => None,
        }
    }

    pub fn should_abort(&self) -> bool {
        matches!(self, SizeDecision::Abort { .. })
    }

    /// `(newSize, shouldAbort)`; an aborted decision reports the size it tried
    pub fn as_pair(&self) -> (usize, bool) {
        match *self {
            SizeDecision::Unchanged(size) => (size, false),
            SizeDecision::Shrunk { to, .. } => (to, false),
            SizeDecision::Abort { attempted } => (attempted, true),
        }
    }
}

/// Decides, per dispatch point, whether a workload runs at full size, runs
/// smaller, or is skipped. Every call re-reads the probe.
#[derive(Clone)]
pub struct SizingPolicy {
    probe: Arc<dyn MemoryProbe>,
    config: SizingConfig,
    metrics: Arc<HarnessMetrics>,
}

impl SizingPolicy {
    pub fn new(probe: Arc<dyn MemoryProbe>, config: SizingConfig) -> Self {
        Self::with_metrics(probe, config, Arc::new(HarnessMetrics::new()))
    }

    pub fn with_metrics(
        probe: Arc<dyn MemoryProbe>,
        config: SizingConfig,
        metrics: Arc<HarnessMetrics>,
    ) -> Self {
        Self {
            probe,
            config,
            metrics,
        }
    }

    pub fn adjust(&self, current_size: usize, memory_floor_mb: f64) -> SizeDecision {
        let available_mb = self.probe.available_mb();
        if available_mb >= memory_floor_mb {
            return SizeDecision::Unchanged(current_size);
        }

        let shrunk = (current_size as f64 * self.config.shrink_factor).floor() as usize;
        warn!(
            "Available memory {:.2} MB is below {:.2} MB, reducing size {} -> {}",
            available_mb, memory_floor_mb, current_size, shrunk
        );

        if shrunk < self.config.min_size {
            warn!(
                "Size {} is below minimum {}, skipping workload",
                shrunk, self.config.min_size
            );
            self.metrics.record_abort();
            return SizeDecision::Abort { attempted: shrunk };
        }

        self.metrics.record_shrink(current_size, shrunk);
        SizeDecision::Shrunk {
            from: current_size,
            to: shrunk,
        }
    }
}
