//! # Resource Budget
//!
//! Explicit memory and time budget for one request, consulted before a
//! large-range computation and before every chunk.

use crate::config::BudgetConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of the current memory usage
pub trait MemoryProbe: Send + Sync {
    /// Resident memory in bytes, when it can be measured
    fn used_bytes(&self) -> Option<u64>;
}

/// Reads the resident set size of the current process
pub struct SysinfoProbe {
    system: Mutex<sysinfo::System>,
    pid: Option<sysinfo::Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("Unable to determine the current pid, memory checks are disabled");
        }
        Self {
            system: Mutex::new(sysinfo::System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SysinfoProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysinfoProbe")
            .field("pid", &self.pid)
            .finish()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn used_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory())
    }
}

/// Probe reporting a constant usage
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub u64);

impl MemoryProbe for FixedProbe {
    fn used_bytes(&self) -> Option<u64> {
        Some(self.0)
    }
}

/// Probe replaying a sequence of readings; the last one repeats
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    readings: Mutex<VecDeque<u64>>,
    last: Mutex<Option<u64>>,
}

impl ScriptedProbe {
    pub fn new(readings: impl IntoIterator<Item = u64>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
            last: Mutex::new(None),
        }
    }
}

impl MemoryProbe for ScriptedProbe {
    fn used_bytes(&self) -> Option<u64> {
        let mut last = self.last.lock();
        if let Some(next) = self.readings.lock().pop_front() {
            *last = Some(next);
        }
        *last
    }
}

/// Outcome of a budget check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    Within,
    MemoryPressure { used: u64, threshold: u64 },
    DeadlineExceeded,
}

impl BudgetCheck {
    pub fn is_within(&self) -> bool {
        matches!(self, BudgetCheck::Within)
    }
}

/// Budget context for one request
#[derive(Clone)]
pub struct Budget {
    threshold_bytes: u64,
    deadline: Option<Instant>,
    probe: Arc<dyn MemoryProbe>,
}

impl fmt::Debug for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Budget")
            .field("threshold_bytes", &self.threshold_bytes)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Budget {
    /// Budget starting now with the configured limits
    pub fn from_config(config: &BudgetConfig, probe: Arc<dyn MemoryProbe>) -> Self {
        let threshold_bytes = (config.memory_limit_bytes() as f64 * config.pressure_ratio) as u64;
        let deadline = config.deadline_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
        Self {
            threshold_bytes,
            deadline,
            probe,
        }
    }

    /// Budget that never trips
    pub fn unlimited() -> Self {
        Self {
            threshold_bytes: u64::MAX,
            deadline: None,
            probe: Arc::new(FixedProbe(0)),
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_bytes
    }

    /// Time left before the deadline
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> BudgetCheck {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return BudgetCheck::DeadlineExceeded;
            }
        }
        match self.probe.used_bytes() {
            Some(used) if used > self.threshold_bytes => {
                BudgetCheck::MemoryPressure {
                    used,
                    threshold: self.threshold_bytes,
                }
            }
            _ => BudgetCheck::Within,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(limit_mb: u64) -> BudgetConfig {
        BudgetConfig {
            memory_limit_mb: limit_mb,
            pressure_ratio: 0.8,
            deadline_secs: None,
        }
    }

    #[test]
    fn test_threshold_applies_pressure_ratio() {
        let budget = Budget::from_config(&config(100), Arc::new(FixedProbe(0)));
        assert_eq!(budget.threshold_bytes(), 80 * 1024 * 1024);
        assert!(budget.check().is_within());
    }

    #[test]
    fn test_memory_pressure_trips() {
        let budget = Budget::from_config(&config(1), Arc::new(FixedProbe(1024 * 1024)));
        assert!(matches!(budget.check(), BudgetCheck::MemoryPressure { .. }));
    }

    #[test]
    fn test_scripted_probe_repeats_last_reading() {
        let probe = ScriptedProbe::new([1, 2]);
        assert_eq!(probe.used_bytes(), Some(1));
        assert_eq!(probe.used_bytes(), Some(2));
        assert_eq!(probe.used_bytes(), Some(2));
        assert_eq!(ScriptedProbe::default().used_bytes(), None);
    }

    #[test]
    fn test_elapsed_deadline() {
        let budget = Budget::unlimited().with_deadline(Instant::now());
        assert_eq!(budget.check(), BudgetCheck::DeadlineExceeded);
        assert_eq!(budget.remaining_time(), Some(Duration::ZERO));
    }

    #[test]
    fn test_sysinfo_probe_reads_memory() {
        let probe = SysinfoProbe::new();
        if let Some(used) = probe.used_bytes() {
            assert!(used > 0);
        }
    }
}
