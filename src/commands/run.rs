//! `varmon run` and `varmon attach` command handlers.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Child, Command};

use anyhow::{bail, Context, Result};
use clap::ArgMatches;

use crate::core::config::{MonitorOptions, MonitorSetup};
use crate::core::process_monitor::{ProcessProbe, SystemProbe};

/// Launch a command and monitor its process tree until it exits
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let options = resolve_options(matches)?;
    let command: Vec<&String> = matches
        .get_many::<String>("command")
        .map(|values| values.collect())
        .unwrap_or_default();
    let Some((program, args)) = command.split_first() else {
        bail!("No command to run");
    };

    // Ctrl-C reaches the monitored tree through the process group; we stay
    // alive to observe its exit and write the summary.
    ctrlc::set_handler(|| {
        log::warn!("Interrupt received, waiting for the monitored process tree to exit");
    })
    .map_err(|e| anyhow::anyhow!("Failed to set Ctrl+C handler: {}", e))?;

    let setup = prepare(&options)?;
    let (setup, child) = launch(setup, *program, args)?;
    log::info!("Launched {} as pid {}", program, child.id());

    monitor(setup, SystemProbe::from_child(child))
}

/// Spawn the command; the log file is removed again when it cannot start
fn launch<S: AsRef<OsStr>>(
    setup: MonitorSetup,
    program: S,
    args: &[S],
) -> Result<(MonitorSetup, Child)> {
    let program = program.as_ref();
    match Command::new(program).args(args).spawn() {
        Ok(child) => Ok((setup, child)),
        Err(e) => {
            if let Err(cleanup) = setup.discard() {
                log::warn!("{}", cleanup);
            }
            Err(e).with_context(|| format!("Failed to launch {:?}", program))
        }
    }
}

/// Monitor an already running process tree
pub fn execute_attach(matches: &ArgMatches) -> Result<()> {
    let options = resolve_options(matches)?;
    let pid = *matches
        .get_one::<u32>("pid")
        .context("Missing --pid")?;

    let setup = prepare(&options)?;
    let probe = match SystemProbe::attach(pid) {
        Ok(probe) => probe,
        Err(e) => {
            if let Err(cleanup) = setup.discard() {
                log::warn!("{}", cleanup);
            }
            return Err(e).with_context(|| format!("Cannot attach to {}", pid));
        }
    };

    monitor(setup, probe)
}

fn prepare(options: &MonitorOptions) -> Result<MonitorSetup> {
    let setup = options
        .prepare()
        .context("Invalid monitor configuration")?;

    if let Some(metric) = setup
        .metrics
        .iter()
        .find(|metric| !SystemProbe::supports_counter(metric.counter()))
    {
        bail!("{} is not available on this platform", metric.name());
    }

    Ok(setup)
}

fn monitor<P: ProcessProbe>(setup: MonitorSetup, probe: P) -> Result<()> {
    let mut monitor = setup.into_monitor(probe)?;
    let summary = monitor.run().context("Monitoring failed")?;
    log::info!("{}", summary.line);
    Ok(())
}

/// Config file values overridden by command line flags
fn resolve_options(matches: &ArgMatches) -> Result<MonitorOptions> {
    let mut options = match matches.get_one::<PathBuf>("config") {
        Some(path) => MonitorOptions::load(path)?,
        None => MonitorOptions::default(),
    };

    if let Some(metrics) = matches.get_many::<String>("metrics") {
        options.metrics = metrics
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
    }
    if let Some(&lapse) = matches.get_one::<f64>("report-lapse") {
        options.report_lapse = lapse;
    }
    if let Some(&lapse) = matches.get_one::<f64>("check-lapse") {
        options.check_lapse = lapse;
    }
    if let Some(&timeout) = matches.get_one::<f64>("reap-timeout") {
        options.reap_timeout = timeout;
    }
    if let Some(path) = matches.get_one::<PathBuf>("log-file") {
        options.log_file = Some(path.clone());
    }
    if let Some(command) = matches.get_one::<String>("hs06-command") {
        options.hs06_factor_command = Some(command.clone());
    }

    Ok(options)
}
