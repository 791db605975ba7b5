use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::process_monitor::{
    build_metrics, LogSink, Metric, MetricContext, MonitorTiming, ProcessProbe,
    ProcessTreeMonitor,
};
use crate::error::{Result, VarmonError};

/// Monitor settings, read from the `[monitor]` table of a TOML file.
///
/// ```toml
/// [monitor]
/// metrics = ["max_rss", "total_cpu_time"]
/// report_lapse = 1.0
/// check_lapse = 0.0
/// log_file = "usage.log"
/// hs06_factor_command = "hs06-factor --quiet"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorOptions {
    /// Metric names in the order they appear in the log
    pub metrics: Vec<String>,
    /// Seconds between two report rows
    pub report_lapse: f64,
    /// Seconds between two sampling passes (0 busy-polls)
    pub check_lapse: f64,
    /// Log destination; stdout when unset. Must not exist yet.
    pub log_file: Option<PathBuf>,
    /// Helper printing `HS06_factor=<value>`, needed by `total_HS06`
    pub hs06_factor_command: Option<String>,
    /// Seconds to wait for the terminated parent to be reaped
    pub reap_timeout: f64,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            metrics: vec!["max_rss".to_string(), "total_cpu_time".to_string()],
            report_lapse: 1.0,
            check_lapse: 0.0,
            log_file: None,
            hs06_factor_command: None,
            reap_timeout: 10.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    monitor: MonitorOptions,
}

/// Everything a monitor needs except the process to watch
#[derive(Debug)]
pub struct MonitorSetup {
    pub metrics: Vec<Metric>,
    pub sink: LogSink,
    pub timing: MonitorTiming,
}

impl MonitorSetup {
    pub fn into_monitor<P: ProcessProbe>(self, probe: P) -> Result<ProcessTreeMonitor<P>> {
        ProcessTreeMonitor::new(probe, self.metrics, self.sink, self.timing)
    }

    /// Give up before monitoring started, removing the log file `prepare` created
    pub fn discard(self) -> Result<()> {
        if let Some(path) = self.sink.path() {
            fs::remove_file(path)?;
            log::debug!("Removed unused usage log {}", path.display());
        }
        Ok(())
    }
}

impl MonitorOptions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            VarmonError::config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let file: ConfigFile = toml::from_str(&content).map_err(|e| {
            VarmonError::config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        Ok(file.monitor)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| VarmonError::config(e.to_string()))?;
        Ok(file.monitor)
    }

    pub fn timing(&self) -> Result<MonitorTiming> {
        Ok(MonitorTiming {
            report_lapse: seconds("report_lapse", self.report_lapse)?,
            check_lapse: seconds("check_lapse", self.check_lapse)?,
            reap_timeout: seconds("reap_timeout", self.reap_timeout)?,
        })
    }

    pub fn metric_context(&self) -> MetricContext<'_> {
        MetricContext {
            hs06_factor_command: self.hs06_factor_command.as_deref(),
        }
    }

    /// Validate everything and open the log destination.
    ///
    /// Nothing is created on disk unless every other check passed.
    pub fn prepare(&self) -> Result<MonitorSetup> {
        if let Some(path) = &self.log_file {
            if path.exists() {
                return Err(VarmonError::DestinationExists(path.clone()));
            }
        }

        let timing = self.timing()?;
        let metrics = build_metrics(&self.metrics, &self.metric_context())?;

        let sink = match &self.log_file {
            Some(path) => LogSink::create_new(path)?,
            None => LogSink::stdout(),
        };

        Ok(MonitorSetup {
            metrics,
            sink,
            timing,
        })
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        VarmonError::config(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        ))
    })
}
