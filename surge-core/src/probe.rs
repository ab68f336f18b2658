// surge-core/src/probe.rs
// Point-in-time snapshots of available system memory

use parking_lot::Mutex;
use std::collections::VecDeque;
use sysinfo::{System, SystemExt};
use tracing::debug;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Source of "how much memory is free right now". Readings are racy by
/// nature: other workers may allocate between a check and the allocation
/// it guards.
pub trait MemoryProbe: Send + Sync {
    fn available_mb(&self) -> f64;
}

/// Reads the host's available memory through sysinfo
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn available_mb(&self) -> f64 {
        let available_bytes = {
            let mut system = self.system.lock();
            system.refresh_memory();
            system.available_memory()
        };

        if available_bytes > 0 {
            return available_bytes as f64 / BYTES_PER_MB;
        }

        // Some containers report 0 through sysinfo; /proc/meminfo is still usable
        #[cfg(target_os = "linux")]
        {
            if let Ok(contents) = std::fs::read_to_string("/proc/meminfo") {
                if let Some(mb) = parse_meminfo_available_mb(&contents) {
                    debug!("sysinfo reported no available memory, /proc/meminfo: {:.2} MB", mb);
                    return mb;
                }
            }
        }

        debug!("Available memory unknown, reporting 0 MB");
        0.0
    }
}

/// Extract `MemAvailable` (or `MemFree` as a fallback) in MB
pub fn parse_meminfo_available_mb(contents: &str) -> Option<f64> {
    let field_kb = |name: &str| {
        contents
            .lines()
            .find(|line| line.starts_with(name))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
    };

    field_kb("MemAvailable:")
        .or_else(|| field_kb("MemFree:"))
        .map(|kb| kb as f64 / 1024.0)
}

/// Always reports the same reading
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryProbe(pub f64);

impl MemoryProbe for FixedMemoryProbe {
    fn available_mb(&self) -> f64 {
        self.0
    }
}

/// Replays a sequence of readings; the last one repeats once the queue drains
pub struct ScriptedMemoryProbe {
    readings: Mutex<VecDeque<f64>>,
    last: Mutex<f64>,
}

impl ScriptedMemoryProbe {
    pub fn new(readings: impl IntoIterator<Item = f64>) -> Self {
        let readings: VecDeque<f64> = readings.into_iter().collect();
        let last = readings.back().copied().unwrap_or(0.0);
        Self {
            readings: Mutex::new(readings),
            last: Mutex::new(last),
        }
    }

    pub fn remaining(&self) -> usize {
        self.readings.lock().len()
    }
}

impl MemoryProbe for ScriptedMemoryProbe {
    fn available_mb(&self) -> f64 {
        match self.readings.lock().pop_front() {
            Some(reading) => {
                *self.last.lock() = reading;
                reading
            }
            None => *self.last.lock(),
        }
    }
}
