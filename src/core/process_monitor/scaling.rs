//! HS06 scaling factor lookup.
//!
//! The benchmark-equivalent metric multiplies CPU time by a per-host factor
//! that an external helper prints as `HS06_factor=<value>`. The helper is run
//! once, before sampling starts.

use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VarmonError};

static FACTOR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"HS06_factor=\s*(\S+)").expect("HS06 factor pattern is valid"));

/// Run the helper command line and extract the HS06 factor from its stdout
pub fn query_hs06_factor(command_line: &str) -> Result<f64> {
    let mut parts = command_line.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| VarmonError::scaling_factor("helper command is empty"))?;

    let program_path = which::which(program).map_err(|e| {
        VarmonError::scaling_factor(format!("cannot locate helper '{}': {}", program, e))
    })?;

    log::debug!("Running HS06 helper {:?}", program_path);

    let output = Command::new(&program_path)
        .args(parts)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            VarmonError::scaling_factor(format!("failed to run '{}': {}", command_line, e))
        })?;

    if !output.status.success() {
        return Err(VarmonError::scaling_factor(format!(
            "'{}' exited with {}",
            command_line, output.status
        )));
    }

    let factor = parse_hs06_factor(&String::from_utf8_lossy(&output.stdout))?;
    log::info!("HS06 factor: {}", factor);
    Ok(factor)
}

/// Find `HS06_factor=<value>` in helper output
pub fn parse_hs06_factor(output: &str) -> Result<f64> {
    let captures = FACTOR_PATTERN
        .captures(output)
        .ok_or_else(|| VarmonError::scaling_factor("output has no HS06_factor= token"))?;

    let raw = &captures[1];
    let factor: f64 = raw
        .parse()
        .map_err(|_| VarmonError::scaling_factor(format!("'{}' is not a number", raw)))?;

    if !factor.is_finite() || factor < 0.0 {
        return Err(VarmonError::scaling_factor(format!(
            "factor {} is out of range",
            factor
        )));
    }

    Ok(factor)
}
