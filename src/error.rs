use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for the varmon library
#[derive(Error, Debug)]
pub enum VarmonError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("Log destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("Scaling factor helper failed: {0}")]
    ScalingFactor(String),

    #[error("Process {pid} could not be read: {reason}")]
    TransientProcess { pid: u32, reason: String },

    #[error("Process tree did not finish: {0}")]
    Exhaustion(String),

    #[error("Invalid monitor state: {0}")]
    InvalidState(String),
}

/// Result type alias for varmon
pub type Result<T> = std::result::Result<T, VarmonError>;

impl VarmonError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        VarmonError::Config(msg.into())
    }

    pub fn scaling_factor<S: Into<String>>(msg: S) -> Self {
        VarmonError::ScalingFactor(msg.into())
    }

    /// Create a transient error for a single process
    pub fn transient<S: Into<String>>(pid: u32, reason: S) -> Self {
        VarmonError::TransientProcess {
            pid,
            reason: reason.into(),
        }
    }

    pub fn exhaustion<S: Into<String>>(msg: S) -> Self {
        VarmonError::Exhaustion(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        VarmonError::InvalidState(msg.into())
    }

    /// Errors that abort a run before sampling starts
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VarmonError::Config(_)
                | VarmonError::UnknownMetric(_)
                | VarmonError::DestinationExists(_)
                | VarmonError::ScalingFactor(_)
        )
    }

    /// Errors the sampling loop recovers from by dropping one process
    pub fn is_transient(&self) -> bool {
        matches!(self, VarmonError::TransientProcess { .. })
    }
}
