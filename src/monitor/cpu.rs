use sysinfo::System;

pub struct CpuMonitor {
    system: System,
}

impl CpuMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        // Initial refresh to get baseline
        system.refresh_cpu_usage();
        Self { system }
    }

    pub fn refresh(&mut self) {
        self.system.refresh_cpu_usage();
    }

    /// System-wide processor-busy percentage since the previous refresh,
    /// rounded half away from zero.
    pub fn busy_percent(&self) -> u8 {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return 0;
        }

        let total: f32 = cpus.iter().map(|cpu| cpu.cpu_usage()).sum();
        let average = total / cpus.len() as f32;
        // f32::round rounds half away from zero, matching the meter's
        // display convention.
        average.round().clamp(0.0, 100.0) as u8
    }

    /// Returns the number of CPU cores
    pub fn core_count(&self) -> usize {
        self.system.cpus().len()
    }
}

impl Default for CpuMonitor {
    fn default() -> Self {
        Self::new()
    }
}
