//! Memory backpressure for the scanner.
//!
//! Pressure is measured with a budget counter (bytes held by the index) and, optionally, a
//! floor on the system's available memory sampled through `sysinfo`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// How often the system memory floor is re-sampled at most.
const SYSTEM_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// When the scanner considers memory pressure critical, and how hard it tries to recover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryBudget {
    /// Ceiling for the bytes held by the line index. `None` disables the check.
    pub max_index_bytes: Option<u64>,
    /// Critical when the system has less than this available. `None` disables the check.
    pub min_available_system_bytes: Option<u64>,
    /// Reclaim-and-recheck cycles before giving up.
    pub reclaim_attempts: u32,
    /// Pause between reclaim cycles.
    pub reclaim_pause_ms: u64,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            max_index_bytes: None,
            min_available_system_bytes: None,
            reclaim_attempts: 3,
            reclaim_pause_ms: 50,
        }
    }
}

/// System memory snapshot attached to progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTelemetry {
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl MemoryTelemetry {
    pub fn sample() -> Self {
        let mut system = System::new();
        Self::sample_from(&mut system)
    }

    fn sample_from(system: &mut System) -> Self {
        system.refresh_memory();
        Self {
            used_bytes: system.used_memory(),
            total_bytes: system.total_memory(),
            available_bytes: system.available_memory(),
        }
    }
}

/// Runtime side of a [`MemoryBudget`], owned by one scan.
pub(super) struct MemoryGuard {
    budget: MemoryBudget,
    system: Option<System>,
    sampled_at: Option<Instant>,
    system_critical: bool,
}

impl MemoryGuard {
    pub fn new(budget: MemoryBudget) -> Self {
        let system = budget.min_available_system_bytes.map(|_| System::new());
        Self {
            budget,
            system,
            sampled_at: None,
            system_critical: false,
        }
    }

    pub fn reclaim_attempts(&self) -> u32 {
        self.budget.reclaim_attempts
    }

    pub fn reclaim_pause(&self) -> Duration {
        Duration::from_millis(self.budget.reclaim_pause_ms)
    }

    /// Cheap enough to call once per finished line.
    pub fn is_critical(&mut self, index_bytes: u64) -> bool {
        if self.budget.max_index_bytes.is_some_and(|max| index_bytes > max) {
            return true;
        }
        self.system_is_critical(false)
    }

    /// Like [`Self::is_critical`], but always re-samples the system.
    pub fn recheck(&mut self, index_bytes: u64) -> bool {
        if self.budget.max_index_bytes.is_some_and(|max| index_bytes > max) {
            return true;
        }
        self.system_is_critical(true)
    }

    fn system_is_critical(&mut self, force: bool) -> bool {
        let (Some(floor), Some(system)) = (self.budget.min_available_system_bytes, self.system.as_mut()) else {
            return false;
        };
        let stale = self.sampled_at.is_none_or(|at| at.elapsed() >= SYSTEM_SAMPLE_INTERVAL);
        if force || stale {
            let telemetry = MemoryTelemetry::sample_from(system);
            self.system_critical = telemetry.available_bytes < floor;
            self.sampled_at = Some(Instant::now());
        }
        self.system_critical
    }
}
