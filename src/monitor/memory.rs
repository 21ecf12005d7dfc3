use sysinfo::System;

pub struct MemoryMonitor {
    system: System,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self { system }
    }

    pub fn refresh(&mut self) {
        self.system.refresh_memory();
    }

    /// Percent of physical RAM committed: `round(100 - available/total * 100)`.
    ///
    /// Available memory, not page-file usage; the two diverge badly and the
    /// meter is meant to show RAM pressure. Computed in integer arithmetic
    /// so the displayed value never drifts from binary floating point.
    pub fn committed_percent(&self) -> u8 {
        committed_percent(self.system.available_memory(), self.system.total_memory())
    }

    /// Returns total memory in bytes
    pub fn total_bytes(&self) -> u64 {
        self.system.total_memory()
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// `round((total - available) * 100 / total)` half away from zero, exact in
/// u128 so the intermediate product cannot overflow.
fn committed_percent(available: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let used = u128::from(total.saturating_sub(available));
    let total = u128::from(total);
    let percent = (used * 200 + total) / (total * 2);
    percent.min(100) as u8
}
