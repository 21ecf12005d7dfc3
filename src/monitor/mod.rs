mod cpu;
mod memory;

pub use cpu::CpuMonitor;
pub use memory::MemoryMonitor;

use std::error::Error;
use std::fmt;

/// One reading of both meters, taken fresh each tick and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Instantaneous processor-busy percentage, 0-100.
    pub cpu_percent: u8,
    /// Percent of physical RAM committed, 0-100.
    pub mem_percent: u8,
}

#[derive(Debug)]
pub enum SamplerError {
    /// The OS reported no processors; the counter subsystem is unusable.
    NoProcessors,
    /// Total physical memory came back as zero.
    NoPhysicalMemory,
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProcessors => write!(f, "no processors reported by the OS"),
            Self::NoPhysicalMemory => write!(f, "total physical memory reported as zero"),
        }
    }
}

impl Error for SamplerError {}

/// Source of meter readings, one per tick.
///
/// The production implementation is [`MetricSampler`]; tests substitute a
/// scripted source to drive the tick loop.
pub trait MetricSource {
    fn sample(&mut self) -> Result<Sample, SamplerError>;
}

/// Samples CPU and memory utilization from the OS.
pub struct MetricSampler {
    cpu: CpuMonitor,
    memory: MemoryMonitor,
}

impl MetricSampler {
    /// Initialize the OS counters and take a baseline reading.
    ///
    /// Fails when the counter subsystem is unusable; that failure is fatal
    /// to the whole program, the driver must not start without a sampler.
    pub fn init() -> Result<Self, SamplerError> {
        let cpu = CpuMonitor::new();
        if cpu.core_count() == 0 {
            return Err(SamplerError::NoProcessors);
        }

        let memory = MemoryMonitor::new();
        if memory.total_bytes() == 0 {
            return Err(SamplerError::NoPhysicalMemory);
        }

        Ok(Self { cpu, memory })
    }
}

impl MetricSource for MetricSampler {
    /// Refresh both counters and return a snapshot.
    ///
    /// The first call after `init` may report 0% CPU while the usage
    /// counter warms up; that is an OS artifact, not an error.
    fn sample(&mut self) -> Result<Sample, SamplerError> {
        self.cpu.refresh();
        self.memory.refresh();

        Ok(Sample {
            cpu_percent: self.cpu.busy_percent(),
            mem_percent: self.memory.committed_percent(),
        })
    }
}
