use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

use varmon::commands;

/// Options shared by `run` and `attach`
fn monitor_args() -> Vec<Arg> {
    vec![
        Arg::new("config")
            .short('c')
            .long("config")
            .value_name("FILE")
            .help("TOML file with a [monitor] table")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("metrics")
            .short('m')
            .long("metrics")
            .value_name("NAMES")
            .help("Comma separated metrics to log, in column order (see 'varmon metrics')")
            .value_delimiter(','),
        Arg::new("report-lapse")
            .short('r')
            .long("report-lapse")
            .value_name("SECONDS")
            .help("Seconds between two report rows [default: 1]")
            .value_parser(clap::value_parser!(f64)),
        Arg::new("check-lapse")
            .long("check-lapse")
            .value_name("SECONDS")
            .help("Seconds between two samples, 0 samples continuously [default: 0]")
            .value_parser(clap::value_parser!(f64)),
        Arg::new("reap-timeout")
            .long("reap-timeout")
            .value_name("SECONDS")
            .help("Seconds to wait for the finished process to be collected [default: 10]")
            .value_parser(clap::value_parser!(f64)),
        Arg::new("log-file")
            .short('o')
            .long("log-file")
            .value_name("PATH")
            .help("Write the usage log to PATH instead of stdout (must not exist)")
            .value_parser(clap::value_parser!(PathBuf)),
        Arg::new("hs06-command")
            .long("hs06-command")
            .value_name("COMMAND")
            .help("Command printing HS06_factor=<value>, required by total_HS06"),
    ]
}

fn main() -> Result<()> {
    varmon::init_logging();

    let matches = Command::new("varmon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Log the resource usage of a process tree")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Run a command and monitor its process tree")
                .args(monitor_args())
                .arg(
                    Arg::new("command")
                        .help("Command to run, after '--'")
                        .required(true)
                        .num_args(1..)
                        .trailing_var_arg(true)
                        .allow_hyphen_values(true)
                        .action(ArgAction::Append),
                ),
        )
        .subcommand(
            Command::new("attach")
                .about("Monitor the process tree of a running process")
                .args(monitor_args())
                .arg(
                    Arg::new("pid")
                        .short('p')
                        .long("pid")
                        .value_name("PID")
                        .help("Pid of the root process")
                        .required(true)
                        .value_parser(clap::value_parser!(u32)),
                ),
        )
        .subcommand(Command::new("metrics").about("List the available metrics"))
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run(sub_matches)?,
        Some(("attach", sub_matches)) => commands::attach(sub_matches)?,
        Some(("metrics", _)) => commands::metrics::execute()?,
        _ => {
            println!("Use 'varmon --help' for more information.");
        }
    }

    Ok(())
}
