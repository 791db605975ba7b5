//! The sampling loop.
//!
//! `Idle -> Sampling -> {Sampling | Reporting} -> ... -> Draining -> Closed`.
//! Each pass reads the whole tree and feeds every live process to every
//! metric, parent first. Rows are flushed once the report lapse has elapsed.
//! When the parent terminates the monitor drains: summaries are finalized,
//! the parent is reaped and a single summary line closes the log.

use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;

use super::metric::Metric;
use super::observation::Counter;
use super::probe::ProcessProbe;
use super::sink::LogSink;
use crate::error::{Result, VarmonError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Marker starting the out-of-band summary line
pub const SUMMARY_PREFIX: &str = "# summary";

/// Timing knobs of the sampling loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorTiming {
    /// Minimum time between two report rows
    pub report_lapse: Duration,
    /// Pause between two sampling passes, zero busy-polls
    pub check_lapse: Duration,
    /// Upper bound for reaping the parent once it terminated
    pub reap_timeout: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            report_lapse: Duration::from_secs(1),
            check_lapse: Duration::ZERO,
            reap_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Sampling,
    Reporting,
    Draining,
    Closed,
}

/// Result of one sampling pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// `processes` processes were folded into the metrics
    Sampled { processes: usize },
    /// The parent could not be read this pass, nothing was updated
    Skipped,
    /// The parent is gone or defunct
    Terminated,
}

/// What the monitor reported when it closed
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// `(metric name, summary value)` in configuration order
    pub values: Vec<(String, String)>,
    pub rows_written: usize,
    pub passes: u64,
    pub line: String,
}

impl RunSummary {
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(metric, _)| metric == name)
            .map(|(_, value)| value.as_str())
    }
}

pub struct ProcessTreeMonitor<P: ProcessProbe> {
    probe: P,
    metrics: Vec<Metric>,
    counters: Vec<Counter>,
    sink: LogSink,
    timing: MonitorTiming,
    state: MonitorState,
    last_report: Instant,
    /// Successful passes since the last row
    window_passes: u64,
    rows_written: usize,
    passes: u64,
    summary: Option<RunSummary>,
}

impl<P: ProcessProbe> ProcessTreeMonitor<P> {
    pub fn new(probe: P, metrics: Vec<Metric>, sink: LogSink, timing: MonitorTiming) -> Result<Self> {
        if metrics.is_empty() {
            return Err(VarmonError::config("no metrics selected"));
        }

        let mut counters: Vec<Counter> = Vec::new();
        for metric in &metrics {
            if !probe.supports(metric.counter()) {
                return Err(VarmonError::config(format!(
                    "{} is not available on this platform",
                    metric.name()
                )));
            }
            if !counters.contains(&metric.counter()) {
                counters.push(metric.counter());
            }
        }

        Ok(Self {
            probe,
            metrics,
            counters,
            sink,
            timing,
            state: MonitorState::Idle,
            last_report: Instant::now(),
            window_passes: 0,
            rows_written: 0,
            passes: 0,
            summary: None,
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn timing(&self) -> &MonitorTiming {
        &self.timing
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn header(&self) -> String {
        let mut header = String::from("timestamp");
        for metric in &self.metrics {
            header.push(',');
            header.push_str(metric.name());
        }
        header
    }

    /// Comma separated `name, value` pairs of the latest pass, for debugging
    pub fn current_values(&self) -> String {
        self.metrics
            .iter()
            .map(|metric| format!("{}, {}", metric.name(), metric.current_value()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Write the header and enter the sampling state
    pub fn start(&mut self) -> Result<()> {
        if self.state != MonitorState::Idle {
            return Err(VarmonError::invalid_state(format!(
                "cannot start from {:?}",
                self.state
            )));
        }

        self.sink.write_line(&self.header())?;
        self.last_report = Instant::now();
        self.state = MonitorState::Sampling;
        log::info!(
            "Monitoring process tree of pid {} ({} metrics)",
            self.probe.parent_pid(),
            self.metrics.len()
        );
        Ok(())
    }

    /// Run one pass over the process tree
    pub fn sample_once(&mut self) -> Result<SampleOutcome> {
        match self.state {
            MonitorState::Sampling => {}
            MonitorState::Draining => return Ok(SampleOutcome::Terminated),
            state => {
                return Err(VarmonError::invalid_state(format!(
                    "cannot sample in {:?}",
                    state
                )))
            }
        }

        self.probe.refresh();

        let liveness = self.probe.liveness();
        if !liveness.is_running() {
            log::info!(
                "Process {} terminated ({:?}), draining",
                self.probe.parent_pid(),
                liveness
            );
            self.state = MonitorState::Draining;
            return Ok(SampleOutcome::Terminated);
        }

        let parent = self.probe.parent_pid();
        let mut processes = 0;

        // The parent comes first: it seeds point-sampled totals
        for pid in self.probe.tree() {
            let is_parent = pid == parent;
            match self.probe.observe(pid, &self.counters) {
                Ok(observation) => {
                    for metric in &mut self.metrics {
                        metric.update(&observation, is_parent);
                    }
                    processes += 1;
                }
                Err(e) if e.is_transient() && is_parent => {
                    log::debug!("Skipping pass: {}", e);
                    return Ok(SampleOutcome::Skipped);
                }
                Err(e) if e.is_transient() => {
                    log::debug!("Skipping process: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        for metric in &mut self.metrics {
            metric.finalize_report();
            metric.finalize_summary();
        }
        self.passes += 1;
        self.window_passes += 1;

        log::trace!("Pass {}: {}", self.passes, self.current_values());

        Ok(SampleOutcome::Sampled { processes })
    }

    /// Whether a row should be written: the report lapse has elapsed and at
    /// least one pass succeeded since the last row
    pub fn report_due(&self) -> bool {
        self.window_passes > 0
            && (self.timing.report_lapse.is_zero()
                || self.last_report.elapsed() > self.timing.report_lapse)
    }

    /// Write one report row and open a new report window
    pub fn flush_report(&mut self) -> Result<()> {
        if self.state != MonitorState::Sampling {
            return Err(VarmonError::invalid_state(format!(
                "cannot report in {:?}",
                self.state
            )));
        }
        self.state = MonitorState::Reporting;

        for metric in &mut self.metrics {
            metric.finalize_report();
        }

        let mut row = Local::now().format(TIMESTAMP_FORMAT).to_string();
        for metric in &self.metrics {
            row.push(',');
            row.push_str(&metric.report_value());
        }

        let written = self.sink.write_line(&row);
        if written.is_ok() {
            for metric in &mut self.metrics {
                metric.reset_report();
            }
            self.rows_written += 1;
        }

        self.last_report = Instant::now();
        self.window_passes = 0;
        self.state = MonitorState::Sampling;
        written
    }

    /// Finalize summaries, reap the parent and write the summary line.
    ///
    /// The summary line is written even when reaping fails; the
    /// [`VarmonError::Exhaustion`] is returned afterwards.
    pub fn finalize_and_close(&mut self) -> Result<RunSummary> {
        match self.state {
            MonitorState::Closed => {
                return self
                    .summary
                    .clone()
                    .ok_or_else(|| VarmonError::invalid_state("closed without a summary"))
            }
            MonitorState::Idle => {
                return Err(VarmonError::invalid_state("monitor was never started"))
            }
            _ => {}
        }
        self.state = MonitorState::Draining;

        for metric in &mut self.metrics {
            metric.finalize_summary();
        }

        let reaped = self.probe.reap(self.timing.reap_timeout);
        if let Err(e) = &reaped {
            log::warn!("{}", e);
        }

        let values: Vec<(String, String)> = self
            .metrics
            .iter()
            .map(|metric| (metric.name().to_string(), metric.summary_value()))
            .collect();

        let mut line = format!(
            "{},{}",
            SUMMARY_PREFIX,
            Local::now().format(TIMESTAMP_FORMAT)
        );
        for (name, value) in &values {
            line.push_str(&format!(",{}={}", name, value));
        }

        self.sink.write_line(&line)?;
        self.state = MonitorState::Closed;

        let summary = RunSummary {
            values,
            rows_written: self.rows_written,
            passes: self.passes,
            line,
        };
        self.summary = Some(summary.clone());

        log::info!(
            "Process tree finished after {} passes, {} rows",
            self.passes,
            self.rows_written
        );

        reaped.map(|_| summary)
    }

    /// Drive the whole lifecycle until the process tree terminates.
    ///
    /// A failing pass or row does not end monitoring: the tree is still
    /// followed to its end, reaped and summarized, then the first error is
    /// returned. No further rows are attempted after a failed one.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.start()?;

        let mut failure: Option<VarmonError> = None;
        loop {
            match self.sample_once() {
                Ok(SampleOutcome::Terminated) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Sampling failed: {}", e);
                    failure.get_or_insert(e);
                }
            }

            if failure.is_none() && self.report_due() {
                if let Err(e) = self.flush_report() {
                    log::warn!("Writing report row failed, continuing without rows: {}", e);
                    failure = Some(e);
                }
            }

            if !self.timing.check_lapse.is_zero() {
                thread::sleep(self.timing.check_lapse);
            }
        }

        let closed = self.finalize_and_close();
        match failure {
            Some(e) => {
                if let Err(later) = &closed {
                    log::warn!("{}", later);
                }
                Err(e)
            }
            None => closed,
        }
    }
}
