//! Fixed mapping from metric name to constructor.

use super::format::Formatter;
use super::metric::{Metric, MetricFamily};
use super::observation::Counter;
use super::scaling::query_hs06_factor;
use crate::error::{Result, VarmonError};

/// Inputs some constructors need besides the metric name
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricContext<'a> {
    /// Command line whose output carries `HS06_factor=<value>`
    pub hs06_factor_command: Option<&'a str>,
}

pub struct RegistryEntry {
    pub name: &'static str,
    pub description: &'static str,
    build: fn(&MetricContext) -> Result<Metric>,
}

impl RegistryEntry {
    pub fn build(&self, context: &MetricContext) -> Result<Metric> {
        (self.build)(context)
    }
}

pub static METRIC_REGISTRY: &[RegistryEntry] = &[
    RegistryEntry {
        name: "max_vms",
        description: "Peak virtual memory size of the tree",
        build: |_| Ok(max_memory("max_vms", Counter::VirtualMemory)),
    },
    RegistryEntry {
        name: "max_rss",
        description: "Peak resident set size of the tree",
        build: |_| Ok(max_memory("max_rss", Counter::ResidentMemory)),
    },
    RegistryEntry {
        name: "max_uss",
        description: "Peak unique set size of the tree (Linux)",
        build: |_| Ok(max_memory("max_uss", Counter::UniqueMemory)),
    },
    RegistryEntry {
        name: "max_pss",
        description: "Peak proportional set size of the tree (Linux)",
        build: |_| Ok(max_memory("max_pss", Counter::ProportionalMemory)),
    },
    RegistryEntry {
        name: "total_io_read",
        description: "Bytes read by every process of the tree",
        build: |_| Ok(total_bytes("total_io_read", Counter::IoReadBytes)),
    },
    RegistryEntry {
        name: "total_io_write",
        description: "Bytes written by every process of the tree",
        build: |_| Ok(total_bytes("total_io_write", Counter::IoWriteBytes)),
    },
    RegistryEntry {
        name: "total_cpu_time",
        description: "User + system CPU seconds of the tree",
        build: |_| {
            Ok(Metric::new(
                "total_cpu_time",
                Counter::CpuSeconds,
                MetricFamily::Cumulative,
                Formatter::Raw,
            ))
        },
    },
    RegistryEntry {
        name: "total_HS06",
        description: "CPU time in HS06 hours, scaled by the host factor",
        build: total_hs06,
    },
];

fn max_memory(name: &str, counter: Counter) -> Metric {
    Metric::new(name, counter, MetricFamily::PointSampled, Formatter::ByteUnit)
}

fn total_bytes(name: &str, counter: Counter) -> Metric {
    Metric::new(name, counter, MetricFamily::Cumulative, Formatter::ByteUnit)
}

fn total_hs06(context: &MetricContext) -> Result<Metric> {
    let command = context.hs06_factor_command.ok_or_else(|| {
        VarmonError::config("total_HS06 requires an HS06 factor command (hs06_factor_command)")
    })?;
    let factor = query_hs06_factor(command)?;

    Ok(Metric::new(
        "total_HS06",
        Counter::CpuSeconds,
        MetricFamily::Cumulative,
        Formatter::FixedDecimal(4),
    )
    .with_scale(factor / 3600.0))
}

pub fn lookup(name: &str) -> Option<&'static RegistryEntry> {
    METRIC_REGISTRY.iter().find(|entry| entry.name == name)
}

pub fn metric_names() -> impl Iterator<Item = &'static str> {
    METRIC_REGISTRY.iter().map(|entry| entry.name)
}

/// Instantiate one metric by registry name
pub fn build_metric(name: &str, context: &MetricContext) -> Result<Metric> {
    lookup(name)
        .ok_or_else(|| VarmonError::UnknownMetric(name.to_string()))?
        .build(context)
}

/// Instantiate the configured metric set, keeping configuration order
pub fn build_metrics<S: AsRef<str>>(names: &[S], context: &MetricContext) -> Result<Vec<Metric>> {
    if names.is_empty() {
        return Err(VarmonError::config("no metrics selected"));
    }

    let mut metrics: Vec<Metric> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_ref();
        if metrics.iter().any(|m| m.name() == name) {
            return Err(VarmonError::config(format!(
                "metric '{}' selected more than once",
                name
            )));
        }
        metrics.push(build_metric(name, context)?);
    }

    Ok(metrics)
}
