//! Raw per-process snapshots handed from the probe to the metrics.

/// OS counter a metric reads from each process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    VirtualMemory,
    ResidentMemory,
    UniqueMemory,
    ProportionalMemory,
    IoReadBytes,
    IoWriteBytes,
    CpuSeconds,
}

impl Counter {
    /// Whether reading this counter needs the per-mapping memory breakdown
    pub fn needs_memory_detail(&self) -> bool {
        matches!(self, Counter::UniqueMemory | Counter::ProportionalMemory)
    }

    /// Whether reading this counter needs the per-process character I/O totals
    pub fn needs_io_detail(&self) -> bool {
        matches!(self, Counter::IoReadBytes | Counter::IoWriteBytes)
    }

    pub fn read(&self, observation: &ProcessObservation) -> f64 {
        match self {
            Counter::VirtualMemory => observation.vms as f64,
            Counter::ResidentMemory => observation.rss as f64,
            Counter::UniqueMemory => observation.uss as f64,
            Counter::ProportionalMemory => observation.pss as f64,
            Counter::IoReadBytes => observation.read_bytes as f64,
            Counter::IoWriteBytes => observation.written_bytes as f64,
            Counter::CpuSeconds => observation.cpu_seconds,
        }
    }
}

/// Counters read from one process during one sampling pass.
///
/// Fields whose counter was not requested stay at zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessObservation {
    pub pid: u32,
    pub rss: u64,
    pub vms: u64,
    pub uss: u64,
    pub pss: u64,
    /// Bytes passed through read-like syscalls, cached or not
    pub read_bytes: u64,
    /// Bytes passed through write-like syscalls
    pub written_bytes: u64,
    /// User + system CPU time
    pub cpu_seconds: f64,
}

impl ProcessObservation {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            ..Default::default()
        }
    }
}
