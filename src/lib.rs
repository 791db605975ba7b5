// varmon library - Public API

// Re-export error types
pub mod error;
pub use error::{Result, VarmonError};

// Module declarations
pub mod commands;
pub mod core;

// Re-export commonly used types
pub use crate::core::config::MonitorOptions;

// Initialize logging. Logs go to stderr so they never mix with a usage log on stdout.
pub fn init_logging() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
