use anyhow::Result;

use crate::core::process_monitor::METRIC_REGISTRY;

/// List the metrics that can be selected with `--metrics`
pub fn execute() -> Result<()> {
    let width = METRIC_REGISTRY
        .iter()
        .map(|entry| entry.name.len())
        .max()
        .unwrap_or(0);

    for entry in METRIC_REGISTRY {
        println!("{:width$}  {}", entry.name, entry.description, width = width);
    }

    Ok(())
}
