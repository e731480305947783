//! CPU and memory signals for batch planning.

use serde::{Deserialize, Serialize};

/// Point-in-time resource reading. Unknown values are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu_cores: usize,
    pub total_memory_mb: Option<u64>,
    pub available_memory_mb: Option<u64>,
    /// One-minute load average
    pub load_average: Option<f64>,
}

impl Default for ResourceSnapshot {
    fn default() -> Self {
        Self {
            cpu_cores: 1,
            total_memory_mb: None,
            available_memory_mb: None,
            load_average: None,
        }
    }
}

impl ResourceSnapshot {
    /// Fraction of memory in use, in [0, 1].
    pub fn memory_pressure(&self) -> Option<f64> {
        match (self.total_memory_mb, self.available_memory_mb) {
            (Some(total), Some(available)) if total > 0 => {
                Some((1.0 - available as f64 / total as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }

    /// Load per core, clamped to [0, 1].
    pub fn cpu_pressure(&self) -> Option<f64> {
        self.load_average
            .map(|load| (load / self.cpu_cores.max(1) as f64).clamp(0.0, 1.0))
    }
}

/// Source of resource snapshots.
pub trait ResourceMonitor: Send + Sync {
    fn snapshot(&self) -> ResourceSnapshot;
}

/// Reads the host: cores from the scheduler, memory and load from `/proc`
/// where available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResourceMonitor;

fn meminfo_mb(meminfo: &str, key: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

impl ResourceMonitor for SystemResourceMonitor {
    fn snapshot(&self) -> ResourceSnapshot {
        let cpu_cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let meminfo = std::fs::read_to_string("/proc/meminfo").ok();
        let total_memory_mb = meminfo.as_deref().and_then(|m| meminfo_mb(m, "MemTotal:"));
        let available_memory_mb = meminfo
            .as_deref()
            .and_then(|m| meminfo_mb(m, "MemAvailable:"));
        let load_average = std::fs::read_to_string("/proc/loadavg")
            .ok()
            .and_then(|s| s.split_whitespace().next().and_then(|v| v.parse().ok()));

        ResourceSnapshot {
            cpu_cores,
            total_memory_mb,
            available_memory_mb,
            load_average,
        }
    }
}

/// Fixed snapshot, for tests and reproducible planning.
#[derive(Debug, Clone, Copy)]
pub struct StaticResourceMonitor(pub ResourceSnapshot);

impl ResourceMonitor for StaticResourceMonitor {
    fn snapshot(&self) -> ResourceSnapshot {
        self.0
    }
}
