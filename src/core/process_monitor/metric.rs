//! Stateful per-tree accumulators.
//!
//! A [`Metric`] is a composition of two independent tags: its
//! [`MetricFamily`] decides how per-process readings fold into the tree
//! total, its [`Formatter`] decides how the total is rendered.

use std::collections::BTreeMap;

use super::format::Formatter;
use super::observation::{Counter, ProcessObservation};

/// Update semantics of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFamily {
    /// Re-read every pass. Parent seeds the total, children add to it.
    /// Report and summary hold the maximum seen.
    PointSampled,
    /// Monotonic per-process counters summed over every pid ever seen.
    Cumulative,
}

/// Readings recorded for one pid by a cumulative metric.
///
/// When a pid is reused by an unrelated process the counter restarts lower;
/// the value of the previous owner moves to `archived` so it keeps counting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PidHistory {
    current: f64,
    archived: Vec<f64>,
}

impl PidHistory {
    fn seeded(value: f64) -> Self {
        Self {
            current: value,
            archived: Vec::new(),
        }
    }

    /// Record a new reading, returns `true` when it revealed a reused pid
    fn record(&mut self, value: f64) -> bool {
        let reused = value < self.current;
        if reused {
            self.archived.push(self.current);
        }
        self.current = value;
        reused
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn archived(&self) -> &[f64] {
        &self.archived
    }

    pub fn total(&self) -> f64 {
        self.current + self.archived.iter().sum::<f64>()
    }
}

#[derive(Debug, Clone)]
pub struct Metric {
    name: String,
    counter: Counter,
    family: MetricFamily,
    formatter: Formatter,
    scale: f64,
    current: f64,
    report: f64,
    summary: f64,
    histories: BTreeMap<u32, PidHistory>,
    reuse_events: u64,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        counter: Counter,
        family: MetricFamily,
        formatter: Formatter,
    ) -> Self {
        Self {
            name: name.into(),
            counter,
            family,
            formatter,
            scale: 1.0,
            current: 0.0,
            report: 0.0,
            summary: 0.0,
            histories: BTreeMap::new(),
            reuse_events: 0,
        }
    }

    /// Multiply every reading by `scale` before aggregating
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counter(&self) -> Counter {
        self.counter
    }

    pub fn family(&self) -> MetricFamily {
        self.family
    }

    pub fn formatter(&self) -> Formatter {
        self.formatter
    }

    /// Fold one process of the current pass into the tree total.
    ///
    /// For point-sampled metrics the parent must come first in each pass.
    pub fn update(&mut self, observation: &ProcessObservation, is_parent: bool) {
        let value = self.counter.read(observation) * self.scale;

        match self.family {
            MetricFamily::PointSampled => {
                if is_parent {
                    self.current = value;
                } else {
                    self.current += value;
                }
            }
            MetricFamily::Cumulative => {
                let pid = observation.pid;
                match self.histories.get_mut(&pid) {
                    Some(history) => {
                        if history.record(value) {
                            self.reuse_events += 1;
                            log::debug!(
                                "{}: pid {} reused, archived previous owner's value",
                                self.name,
                                pid
                            );
                        }
                    }
                    None => {
                        self.histories.insert(pid, PidHistory::seeded(value));
                    }
                }
                self.current = self.histories.values().map(PidHistory::total).sum();
            }
        }
    }

    /// Fold the current total into the report window
    pub fn finalize_report(&mut self) {
        self.report = match self.family {
            MetricFamily::PointSampled => self.report.max(self.current),
            MetricFamily::Cumulative => self.current,
        };
    }

    /// Start a new report window
    pub fn reset_report(&mut self) {
        if self.family == MetricFamily::PointSampled {
            self.report = 0.0;
        }
    }

    /// Fold the current total into the whole-run summary
    pub fn finalize_summary(&mut self) {
        self.summary = match self.family {
            MetricFamily::PointSampled => self.summary.max(self.current),
            MetricFamily::Cumulative => self.current,
        };
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn report(&self) -> f64 {
        self.report
    }

    pub fn summary(&self) -> f64 {
        self.summary
    }

    pub fn current_value(&self) -> String {
        self.formatter.apply(self.current)
    }

    pub fn report_value(&self) -> String {
        self.formatter.apply(self.report)
    }

    pub fn summary_value(&self) -> String {
        self.formatter.apply(self.summary)
    }

    /// Number of pid reuse events detected so far
    pub fn reuse_events(&self) -> u64 {
        self.reuse_events
    }

    pub fn history(&self, pid: u32) -> Option<&PidHistory> {
        self.histories.get(&pid)
    }
}
