//! Process tree resource monitoring.
//!
//! This module samples a process and all of its descendants, folds the
//! readings into per-tree metrics and writes report rows and a final summary
//! line to a [`LogSink`].

mod format;
mod metric;
mod monitor;
mod observation;
pub mod probe;
pub mod registry;
mod scaling;
mod sink;

pub use format::{format_bytes, format_number, Formatter};
pub use metric::{Metric, MetricFamily, PidHistory};
pub use monitor::{
    MonitorState, MonitorTiming, ProcessTreeMonitor, RunSummary, SampleOutcome, SUMMARY_PREFIX,
};
pub use observation::{Counter, ProcessObservation};
pub use probe::{Liveness, ProcessProbe, SystemProbe};
pub use registry::{build_metric, build_metrics, metric_names, MetricContext, METRIC_REGISTRY};
pub use scaling::{parse_hs06_factor, query_hs06_factor};
pub use sink::{LogSink, SharedBuffer};
