// surge-cli/src/config.rs
// Configuration file loading and command-line overrides

use anyhow::Result;
use serde::{Deserialize, Serialize};
use surge_core::config::{available_cores, workers_for_fraction};
use surge_core::report::DEFAULT_RESULTS_PATH;
use surge_core::{HarnessConfig, PoolKind};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolKind,
    pub harness: HarnessConfig,
    pub workers: WorkersConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Share of logical cores, only used when no explicit count is given
    pub fraction: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_RESULTS_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

/// Values given on the command line; `None` leaves the file's value alone
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub output: Option<String>,
    pub multipliers: Option<Vec<f64>>,
    pub workers: Option<usize>,
    pub worker_fraction: Option<f64>,
    pub memory_floor_mb: Option<f64>,
    pub pool: Option<PoolKind>,
    pub recursion: Option<surge_core::RecursionStrategy>,
    pub no_memory_phase: bool,
    pub no_multiply: bool,
    pub no_pause: bool,
    pub log_format: Option<LogFormat>,
}

/// Why `Config::load` fell back to defaults. Reported once logging is up.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigFallback {
    Missing { path: String },
    Invalid { path: String, reason: String },
}

impl ConfigFallback {
    pub fn warn(&self) {
        match self {
            ConfigFallback::Missing { path } => {
                warn!("Config file {} not found, using defaults", path)
            }
            ConfigFallback::Invalid { path, reason } => {
                warn!("Failed to parse config file {}: {}, using defaults", path, reason)
            }
        }
    }
}

impl Config {
    /// Missing or unparsable files fall back to defaults
    pub fn load(path: &str) -> (Self, Option<ConfigFallback>) {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => (config, None),
                Err(e) => (
                    Self::default(),
                    Some(ConfigFallback::Invalid {
                        path: path.to_string(),
                        reason: e.to_string(),
                    }),
                ),
            },
            Err(_) => (
                Self::default(),
                Some(ConfigFallback::Missing {
                    path: path.to_string(),
                }),
            ),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let explicit_count = table
            .get("harness")
            .and_then(|harness| harness.get("worker_count"))
            .is_some();

        let mut config: Config = toml::from_str(content)?;
        // an explicit count in the file wins over the fraction
        if let (Some(fraction), false) = (config.workers.fraction, explicit_count) {
            config.harness.worker_count = workers_for_fraction(available_cores(), fraction);
        }
        Ok(config)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(output) = overrides.output {
            self.output.path = output;
        }
        if let Some(multipliers) = overrides.multipliers {
            self.harness.size_multipliers = multipliers;
        }
        if let Some(fraction) = overrides.worker_fraction {
            self.workers.fraction = Some(fraction);
            self.harness.worker_count = workers_for_fraction(available_cores(), fraction);
        }
        // an explicit count wins over any fraction
        if let Some(workers) = overrides.workers {
            self.harness.worker_count = workers;
        }
        if let Some(floor) = overrides.memory_floor_mb {
            self.harness.memory_floor_mb = floor;
        }
        if let Some(pool) = overrides.pool {
            self.pool = pool;
        }
        if let Some(strategy) = overrides.recursion {
            self.harness.recursion.strategy = strategy;
        }
        if overrides.no_memory_phase {
            self.harness.use_memory_phase = false;
        }
        if overrides.no_multiply {
            self.harness.multiply = false;
        }
        if overrides.no_pause {
            self.harness = self.harness.clone().without_pauses();
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }
}
