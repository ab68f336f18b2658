// surge-core/src/report.rs
// Result records and the sinks that persist them

use crate::error::{Result, SurgeError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MULTIPROCESSING_TEST: &str = "multiprocessing CPU with memory";
pub const RECURSION_TEST: &str = "recursive CPU";
pub const DEFAULT_RESULTS_PATH: &str = "cpu_stress_test_results.json";

/// One test of one round. Parameters are flattened next to `test` and
/// `time` when serialized and keep their insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub test: String,
    #[serde(flatten)]
    pub parameters: IndexMap<String, Value>,
    pub time: f64,
    /// The workload did not run; `time` is 0 and says nothing about speed
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoundRecord {
    pub fn new(test: &str) -> Self {
        Self {
            test: test.to_string(),
            parameters: IndexMap::new(),
            time: 0.0,
            skipped: false,
            error: None,
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn timed(mut self, seconds: f64) -> Self {
        self.time = seconds;
        self
    }

    pub fn skipped(mut self) -> Self {
        self.time = 0.0;
        self.skipped = true;
        self
    }

    pub fn failed(self, error: &SurgeError) -> Self {
        let mut record = self.skipped();
        record.error = Some(error.to_string());
        record
    }
}

/// Every record of one round, in the order the tests ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResults {
    pub size_multiplier: f64,
    pub results: Vec<RoundRecord>,
}

/// Append-only output of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    rounds: Vec<RoundResults>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, size_multiplier: f64, results: Vec<RoundRecord>) {
        self.rounds.push(RoundResults {
            size_multiplier,
            results,
        });
    }

    pub fn rounds(&self) -> &[RoundResults] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Pretty JSON with four-space indentation
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_json(&mut buf)?;
        String::from_utf8(buf).map_err(|e| SurgeError::InvalidResult(e.to_string()))
    }

    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)
            .map_err(|e| SurgeError::Serialization {
                context: "result set".to_string(),
                source: e,
            })
    }
}

/// Receives the finished result set exactly once, after the last round
pub trait ResultSink: Send + Sync {
    fn persist(&self, results: &ResultSet) -> Result<()>;
}

/// Writes the result set as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileSink {
    fn default() -> Self {
        Self::new(DEFAULT_RESULTS_PATH)
    }
}

impl ResultSink for JsonFileSink {
    fn persist(&self, results: &ResultSet) -> Result<()> {
        let file = File::create(&self.path)
            .map_err(|e| SurgeError::io(&format!("create {}", self.path.display()), e))?;
        let mut writer = BufWriter::new(file);
        results.write_json(&mut writer)?;
        writer
            .flush()
            .map_err(|e| SurgeError::io(&format!("write {}", self.path.display()), e))?;

        info!("Results saved to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the result set in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    persisted: Mutex<Vec<ResultSet>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `persist` was called
    pub fn persist_count(&self) -> usize {
        self.persisted.lock().len()
    }

    pub fn last(&self) -> Option<ResultSet> {
        self.persisted.lock().last().cloned()
    }
}

impl ResultSink for MemorySink {
    fn persist(&self, results: &ResultSet) -> Result<()> {
        self.persisted.lock().push(results.clone());
        Ok(())
    }
}
