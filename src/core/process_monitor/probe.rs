//! Operating system access for the monitor.
//!
//! [`ProcessProbe`] is the seam between the sampling loop and the OS: the
//! loop only ever sees pids, liveness and [`ProcessObservation`]s.
//! [`SystemProbe`] implements it on top of `sysinfo`.

use std::collections::{HashMap, VecDeque};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use super::observation::{Counter, ProcessObservation};
use crate::error::{Result, VarmonError};

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State of the monitored parent process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    /// Exited but not reaped yet (zombie) or marked dead by the OS
    Defunct,
    /// No longer in the process table
    Gone,
}

impl Liveness {
    pub fn is_running(&self) -> bool {
        matches!(self, Liveness::Running)
    }
}

pub trait ProcessProbe {
    /// Pid of the root of the monitored tree
    fn parent_pid(&self) -> u32;

    /// Re-read OS state. Called once at the start of every pass.
    fn refresh(&mut self);

    fn liveness(&self) -> Liveness;

    /// The parent followed by all of its descendants
    fn tree(&self) -> Vec<u32>;

    /// Snapshot the requested counters of one process.
    ///
    /// Fails with [`VarmonError::TransientProcess`] when the process vanished
    /// or could not be read.
    fn observe(&self, pid: u32, counters: &[Counter]) -> Result<ProcessObservation>;

    /// Whether this probe can read `counter` at all on this platform
    fn supports(&self, _counter: Counter) -> bool {
        true
    }

    /// Wait for the terminated parent to be collected, bounded by `timeout`
    fn reap(&mut self, timeout: Duration) -> Result<()>;
}

/// Per-mapping memory totals from `/proc/<pid>/smaps_rollup`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryDetail {
    pub uss: u64,
    pub pss: u64,
}

/// Parse `smaps_rollup` content. USS is the private (clean + dirty) memory.
pub fn parse_smaps_rollup(content: &str) -> MemoryDetail {
    let mut detail = MemoryDetail::default();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(kib) = value.parse::<u64>() else {
            continue;
        };
        let bytes = kib * 1024;

        match key {
            "Pss:" => detail.pss = bytes,
            "Private_Clean:" | "Private_Dirty:" => detail.uss += bytes,
            _ => {}
        }
    }

    detail
}

/// Character I/O totals from `/proc/<pid>/io`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoDetail {
    pub read_chars: u64,
    pub written_chars: u64,
}

/// Parse `/proc/<pid>/io` content, keeping `rchar` and `wchar`
pub fn parse_proc_io(content: &str) -> IoDetail {
    let mut detail = IoDetail::default();

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            continue;
        };

        match key.trim() {
            "rchar" => detail.read_chars = value,
            "wchar" => detail.written_chars = value,
            _ => {}
        }
    }

    detail
}

#[cfg(target_os = "linux")]
fn read_proc_file(pid: u32, name: &str) -> Result<String> {
    use std::io::ErrorKind;

    std::fs::read_to_string(format!("/proc/{}/{}", pid, name)).map_err(|e| match e.kind() {
        ErrorKind::NotFound => VarmonError::transient(pid, "vanished"),
        ErrorKind::PermissionDenied => VarmonError::transient(pid, "access denied"),
        _ => VarmonError::transient(pid, e.to_string()),
    })
}

#[cfg(target_os = "linux")]
fn read_memory_detail(pid: u32) -> Result<MemoryDetail> {
    read_proc_file(pid, "smaps_rollup").map(|content| parse_smaps_rollup(&content))
}

#[cfg(not(target_os = "linux"))]
fn read_memory_detail(pid: u32) -> Result<MemoryDetail> {
    Err(VarmonError::transient(
        pid,
        "memory detail is only available on Linux",
    ))
}

#[cfg(target_os = "linux")]
fn read_io_detail(pid: u32) -> Result<Option<IoDetail>> {
    read_proc_file(pid, "io").map(|content| Some(parse_proc_io(&content)))
}

/// Elsewhere the `sysinfo` disk counters are the closest equivalent
#[cfg(not(target_os = "linux"))]
fn read_io_detail(_pid: u32) -> Result<Option<IoDetail>> {
    Ok(None)
}

/// Probe backed by the `sysinfo` process table
pub struct SystemProbe {
    system: System,
    parent: Pid,
    child: Option<Child>,
    refresh_kind: ProcessRefreshKind,
}

impl SystemProbe {
    /// Monitor a process this program spawned; reaping goes through `child`
    pub fn from_child(child: Child) -> Self {
        let parent = Pid::from_u32(child.id());
        Self::new(parent, Some(child))
    }

    /// Monitor an already running process by pid
    pub fn attach(pid: u32) -> Result<Self> {
        let mut probe = Self::new(Pid::from_u32(pid), None);
        probe.refresh();
        if probe.liveness() == Liveness::Gone {
            return Err(VarmonError::config(format!("no process with pid {}", pid)));
        }
        Ok(probe)
    }

    /// Counters this probe can read on the current platform
    pub fn supports_counter(counter: Counter) -> bool {
        !counter.needs_memory_detail() || cfg!(target_os = "linux")
    }

    fn new(parent: Pid, child: Option<Child>) -> Self {
        let refresh_kind = ProcessRefreshKind::nothing()
            .with_memory()
            .with_cpu()
            .with_disk_usage();

        Self {
            system: System::new(),
            parent,
            child,
            refresh_kind,
        }
    }

    fn parent_state(&self) -> Liveness {
        match self.system.process(self.parent) {
            None => Liveness::Gone,
            Some(process) => match process.status() {
                ProcessStatus::Zombie | ProcessStatus::Dead => Liveness::Defunct,
                _ => Liveness::Running,
            },
        }
    }

    fn reap_child(child: &mut Child, deadline: Instant) -> Result<()> {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    log::info!("Monitored process {} exited with {}", child.id(), status);
                    return Ok(());
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(VarmonError::exhaustion(format!(
                        "waiting for process {} failed: {}",
                        child.id(),
                        e
                    )))
                }
            }

            if Instant::now() >= deadline {
                return Err(VarmonError::exhaustion(format!(
                    "process {} was not reaped in time",
                    child.id()
                )));
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }

    fn wait_until_gone(&mut self, deadline: Instant) -> Result<()> {
        loop {
            self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[self.parent]),
                true,
                ProcessRefreshKind::nothing(),
            );
            // Someone else owns a foreign parent; a zombie is as gone as we can observe
            if !self.parent_state().is_running() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(VarmonError::exhaustion(format!(
                    "process {} is still running",
                    self.parent
                )));
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }
}

impl ProcessProbe for SystemProbe {
    fn parent_pid(&self) -> u32 {
        self.parent.as_u32()
    }

    fn refresh(&mut self) {
        self.system
            .refresh_processes_specifics(ProcessesToUpdate::All, true, self.refresh_kind);
    }

    fn liveness(&self) -> Liveness {
        self.parent_state()
    }

    fn tree(&self) -> Vec<u32> {
        let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
        for (pid, process) in self.system.processes() {
            if process.thread_kind().is_some() {
                continue;
            }
            if let Some(parent) = process.parent() {
                children.entry(parent).or_default().push(*pid);
            }
        }

        let mut tree = vec![self.parent.as_u32()];
        let mut queue = VecDeque::from([self.parent]);
        while let Some(pid) = queue.pop_front() {
            if let Some(kids) = children.get(&pid) {
                for kid in kids {
                    if *kid == self.parent {
                        continue;
                    }
                    tree.push(kid.as_u32());
                    queue.push_back(*kid);
                }
            }
        }

        tree
    }

    fn observe(&self, pid: u32, counters: &[Counter]) -> Result<ProcessObservation> {
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or_else(|| VarmonError::transient(pid, "vanished"))?;

        let disk = process.disk_usage();
        let mut observation = ProcessObservation {
            pid,
            rss: process.memory(),
            vms: process.virtual_memory(),
            read_bytes: disk.total_read_bytes,
            written_bytes: disk.total_written_bytes,
            cpu_seconds: process.accumulated_cpu_time() as f64 / 1000.0,
            ..Default::default()
        };

        if counters.iter().any(Counter::needs_memory_detail) {
            let detail = read_memory_detail(pid)?;
            observation.uss = detail.uss;
            observation.pss = detail.pss;
        }

        if counters.iter().any(Counter::needs_io_detail) {
            if let Some(detail) = read_io_detail(pid)? {
                observation.read_bytes = detail.read_chars;
                observation.written_bytes = detail.written_chars;
            }
        }

        Ok(observation)
    }

    fn supports(&self, counter: Counter) -> bool {
        Self::supports_counter(counter)
    }

    fn reap(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        match self.child.as_mut() {
            Some(child) => Self::reap_child(child, deadline),
            None => self.wait_until_gone(deadline),
        }
    }
}
