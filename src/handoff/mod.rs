//! # Handoff
//!
//! Transfers execution to the wrapped command once the gate opens.
//!
//! - [`HandoffMode::Supervise`]: run the command as a child with inherited
//!   stdio, relay termination signals to it, and report its exit code
//! - [`HandoffMode::Exec`] (unix): replace the gate's process image, so no
//!   wrapper remains

#[cfg(unix)]
pub mod exec;
pub mod supervisor;

use crate::config::HandoffConfig;
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    #[default]
    Supervise,
    Exec,
}

#[derive(Debug, Clone)]
pub struct Handoff {
    mode: HandoffMode,
    forward_signals: bool,
}

impl Handoff {
    pub fn from_config(config: &HandoffConfig) -> Self {
        Self {
            mode: config.mode,
            forward_signals: config.forward_signals,
        }
    }

    pub fn mode(&self) -> HandoffMode {
        self.mode
    }

    /// Run `command` and return the exit code the gate should exit with.
    pub async fn run(&self, command: &[String]) -> GateResult<i32> {
        let (program, _) = command.split_first().ok_or(GateError::EmptyCommand)?;
        info!(program = %program, mode = ?self.mode, "Handing off");

        match self.mode {
            HandoffMode::Supervise => supervisor::supervise(command, self.forward_signals).await,
            #[cfg(unix)]
            HandoffMode::Exec => match exec::replace_process(command)? {},
            #[cfg(not(unix))]
            HandoffMode::Exec => Err(GateError::Internal(
                "exec handoff is only available on unix".to_string(),
            )),
        }
    }
}
