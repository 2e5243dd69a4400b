//! # Startup Gate
//!
//! Blocks until every configured dependency answers its readiness probe,
//! then hands execution to the wrapped command.
//!
//! ```text
//! Waiting { target, attempt } --every target answers--> Ready --> Handoff
//!            |
//!            +--retry budget spent--> Exhausted
//! ```
//!
//! Targets are awaited in declaration order. Each target has its own attempt
//! counter; the elapsed-time budget is shared and measured from gate start.
//! A slow attempt is cut off at the end of that budget.

use crate::config::{ConfigResult, GateConfig};
use crate::error::{GateError, GateResult};
use crate::handoff::Handoff;
use crate::probe::{build_probe, ProbeError, ReadinessProbe};
use crate::resilience::RetryPolicy;
use serde::Serialize;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

/// Where the gate currently is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GateState {
    /// Probing `target`; `attempt` is 1-based
    Waiting { target: String, attempt: u32 },
    /// All dependencies answered
    Ready,
    /// Execution passed to the wrapped command
    Handoff,
    /// Retry budget spent before a dependency answered
    Exhausted { target: String },
}

/// Outcome of waiting on a single dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
    pub name: String,
    pub failed_attempts: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub targets: Vec<TargetReport>,
    pub elapsed: Duration,
}

impl GateReport {
    pub fn failed_attempts(&self) -> u32 {
        self.targets.iter().map(|t| t.failed_attempts).sum()
    }
}

pub struct StartupGate {
    probes: Vec<Box<dyn ReadinessProbe>>,
    policy: RetryPolicy,
    state: GateState,
}

impl std::fmt::Debug for StartupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupGate")
            .field("probes", &self.probes.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("state", &self.state)
            .finish()
    }
}

impl StartupGate {
    pub fn new(probes: Vec<Box<dyn ReadinessProbe>>, policy: RetryPolicy) -> Self {
        let state = GateState::Waiting {
            target: probes.first().map(|p| p.name().to_string()).unwrap_or_default(),
            attempt: 1,
        };
        Self {
            probes,
            policy,
            state,
        }
    }

    pub fn from_config(config: &GateConfig) -> ConfigResult<Self> {
        let probes = config
            .targets
            .iter()
            .map(build_probe)
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self::new(probes, config.retry.clone()))
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Probe every dependency until it answers or the retry budget runs out.
    pub async fn wait_until_ready(&mut self) -> GateResult<GateReport> {
        let started = Instant::now();
        let mut targets = Vec::with_capacity(self.probes.len());

        for index in 0..self.probes.len() {
            targets.push(self.wait_for(index, started).await?);
        }

        self.state = GateState::Ready;
        let report = GateReport {
            targets,
            elapsed: started.elapsed(),
        };
        info!(
            failed_attempts = report.failed_attempts(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "All dependencies ready"
        );
        Ok(report)
    }

    /// Run `command` through `handoff`; only allowed once the gate is ready.
    pub async fn hand_off(&mut self, handoff: &Handoff, command: &[String]) -> GateResult<i32> {
        if self.state != GateState::Ready {
            return Err(GateError::Internal(format!(
                "handoff requested in state {:?}",
                self.state
            )));
        }
        self.state = GateState::Handoff;
        handoff.run(command).await
    }

    async fn wait_for(&mut self, index: usize, started: Instant) -> GateResult<TargetReport> {
        let probe = &self.probes[index];
        let name = probe.name().to_string();
        let target_started = Instant::now();
        let mut failed_attempts = 0u32;

        loop {
            self.state = GateState::Waiting {
                target: name.clone(),
                attempt: failed_attempts + 1,
            };

            // An attempt never runs past the elapsed budget
            let attempt = probe.probe();
            let outcome = match self.policy.remaining_budget(started.elapsed()) {
                Some(remaining) => timeout(remaining, attempt)
                    .await
                    .unwrap_or_else(|_| Err(ProbeError::timeout(&name, remaining))),
                None => attempt.await,
            };

            let error = match outcome {
                Ok(()) => {
                    info!(target_name = %name, failed_attempts, "Dependency is ready");
                    return Ok(TargetReport {
                        name,
                        failed_attempts,
                        elapsed: target_started.elapsed(),
                    });
                }
                Err(e) => e,
            };

            failed_attempts += 1;
            let delay = self.policy.delay_for(failed_attempts);

            if !self.policy.attempts_remaining(failed_attempts)
                || !self.policy.within_elapsed_budget(started.elapsed(), delay)
            {
                error!(
                    target_name = %name,
                    attempts = failed_attempts,
                    error = %error,
                    "Dependency unavailable, giving up"
                );
                self.state = GateState::Exhausted {
                    target: name.clone(),
                };
                return Err(GateError::DependencyUnavailable {
                    target: name,
                    attempts: failed_attempts,
                    elapsed: started.elapsed(),
                    last_error: error,
                });
            }

            warn!(
                target_name = %name,
                attempt = failed_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "Dependency unavailable - sleeping"
            );
            sleep(delay).await;
        }
    }
}

/// Wait for the configured dependencies, then run `command`.
///
/// Returns the exit code the gate process should terminate with: the
/// command's own code after a supervised handoff. In exec mode this only
/// returns on failure.
pub async fn open_and_handoff(config: &GateConfig, command: &[String]) -> GateResult<i32> {
    if command.first().map_or(true, |program| program.is_empty()) {
        return Err(GateError::EmptyCommand);
    }

    let mut gate = StartupGate::from_config(config)?;
    gate.wait_until_ready().await?;
    gate.hand_off(&Handoff::from_config(&config.handoff), command).await
}
