use std::sync::Mutex;
use sysinfo::System;

/// Source of memory utilisation samples for the governor
pub trait MemoryProbe: Send + Sync {
    /// Used memory as a percentage of total, or `None` if it cannot be read
    fn utilization(&self) -> Option<f64>;
}

/// Reads host memory through `sysinfo`
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
    fn utilization(&self) -> Option<f64> {
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        Some(system.used_memory() as f64 / total as f64 * 100.0)
    }
}
