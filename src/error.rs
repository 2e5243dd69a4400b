//! Error types for the startup gate.
//!
//! Every failure the gate can surface to its caller funnels into [`GateError`],
//! which also knows the process exit code the binary should terminate with.

use crate::config::ConfigurationError;
use crate::constants::exit_codes;
use crate::probe::ProbeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Dependency '{target}' still unavailable after {attempts} attempts in {elapsed:?}: {last_error}")]
    DependencyUnavailable {
        target: String,
        attempts: u32,
        elapsed: Duration,
        last_error: ProbeError,
    },

    #[error("No command given to hand off to")]
    EmptyCommand,

    #[error("Command '{program}' not found")]
    CommandNotFound { program: String },

    #[error("Command '{program}' is not executable")]
    CommandNotExecutable { program: String },

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal forwarding error: {0}")]
    SignalForwarding(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Map a spawn/exec failure onto the shell's conventions for missing and
    /// non-executable programs.
    pub fn from_launch_error(program: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => GateError::CommandNotFound {
                program: program.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => GateError::CommandNotExecutable {
                program: program.to_string(),
            },
            _ => GateError::Launch {
                program: program.to_string(),
                source,
            },
        }
    }

    /// Exit code the gate process should terminate with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            GateError::Configuration(_) | GateError::EmptyCommand => exit_codes::CONFIG,
            GateError::DependencyUnavailable { .. } => exit_codes::UNAVAILABLE,
            GateError::CommandNotFound { .. } => exit_codes::COMMAND_NOT_FOUND,
            GateError::CommandNotExecutable { .. } => exit_codes::COMMAND_NOT_EXECUTABLE,
            GateError::Launch { .. } => exit_codes::IO_ERROR,
            GateError::SignalForwarding(_) | GateError::Internal(_) => exit_codes::SOFTWARE,
        }
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;
