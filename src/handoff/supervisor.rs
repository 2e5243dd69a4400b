//! Supervised handoff: the command runs as our child with inherited stdio,
//! termination signals are relayed to it, and its exit status becomes ours.

use crate::constants::exit_codes;
use crate::error::{GateError, GateResult};
use std::process::ExitStatus;
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Spawn `command`, wait for it, and return its exit code.
pub async fn supervise(command: &[String], forward_signals: bool) -> GateResult<i32> {
    let (program, args) = command.split_first().ok_or(GateError::EmptyCommand)?;

    // Listen before spawning so a signal that arrives while the child starts
    // is relayed rather than killing the gate.
    let relay = if forward_signals {
        Some(SignalRelay::install()?)
    } else {
        None
    };

    let mut child = Command::new(program)
        .args(args)
        .spawn()
        .map_err(|e| GateError::from_launch_error(program, e))?;

    info!(pid = child.id(), program = %program, "Command started");

    let status = match relay {
        Some(relay) => relay.wait(&mut child).await?,
        None => wait(&mut child).await?,
    };

    let code = exit_code_of(status);
    info!(program = %program, exit_code = code, "Command finished");
    Ok(code)
}

async fn wait(child: &mut Child) -> GateResult<ExitStatus> {
    child
        .wait()
        .await
        .map_err(|e| GateError::Internal(format!("failed to wait for child: {e}")))
}

#[cfg(unix)]
struct SignalRelay {
    received: tokio::sync::mpsc::UnboundedReceiver<nix::sys::signal::Signal>,
    listeners: Vec<tokio::task::JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalRelay {
    fn install() -> GateResult<Self> {
        use nix::sys::signal::Signal;
        use tokio::signal::unix::{signal, SignalKind};
        use tokio::sync::mpsc;

        const FORWARDED: [(fn() -> SignalKind, Signal); 6] = [
            (SignalKind::interrupt, Signal::SIGINT),
            (SignalKind::terminate, Signal::SIGTERM),
            (SignalKind::hangup, Signal::SIGHUP),
            (SignalKind::quit, Signal::SIGQUIT),
            (SignalKind::user_defined1, Signal::SIGUSR1),
            (SignalKind::user_defined2, Signal::SIGUSR2),
        ];

        let (tx, received) = mpsc::unbounded_channel();
        let mut listeners = Vec::with_capacity(FORWARDED.len());
        for (kind, forwarded) in FORWARDED {
            let mut stream = signal(kind()).map_err(|e| {
                GateError::SignalForwarding(format!("cannot listen for {forwarded}: {e}"))
            })?;
            let tx = tx.clone();
            listeners.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.send(forwarded).is_err() {
                        break;
                    }
                }
            }));
        }

        Ok(Self {
            received,
            listeners,
        })
    }

    async fn wait(mut self, child: &mut Child) -> GateResult<ExitStatus> {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Already reaped: nothing left to signal
        let Some(pid) = child.id() else {
            return wait(child).await;
        };
        let pid = Pid::from_raw(pid as i32);

        loop {
            tokio::select! {
                status = child.wait() => {
                    return status.map_err(|e| GateError::Internal(format!("failed to wait for child: {e}")));
                }
                Some(received) = self.received.recv() => {
                    debug!(signal = %received, pid = %pid, "Forwarding signal to command");
                    if let Err(e) = kill(pid, received) {
                        // ESRCH: the child is gone and wait() is about to say so
                        debug!(signal = %received, error = %e, "Could not forward signal");
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
impl Drop for SignalRelay {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

#[cfg(not(unix))]
struct SignalRelay;

#[cfg(not(unix))]
impl SignalRelay {
    fn install() -> GateResult<Self> {
        Ok(Self)
    }

    async fn wait(self, child: &mut Child) -> GateResult<ExitStatus> {
        wait(child).await
    }
}

/// Exit code for a finished child; `128 + n` if it was killed by signal `n`.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return exit_codes::SIGNAL_BASE + signal;
        }
    }
    exit_codes::SOFTWARE
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_exit_codes_pass_through() {
        for code in [0, 1, 3, 42, 255] {
            let result = supervise(&sh(&format!("exit {code}")), false).await.unwrap();
            assert_eq!(result, code);
        }
    }

    #[tokio::test]
    async fn test_death_by_signal_maps_to_128_plus_signal() {
        let result = supervise(&sh("kill -TERM $$"), false).await.unwrap();
        assert_eq!(result, 128 + 15);
    }

    #[tokio::test]
    async fn test_forwarding_mode_still_reports_exit_code() {
        let result = supervise(&sh("exit 5"), true).await.unwrap();
        assert_eq!(result, 5);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let command = vec!["definitely-not-on-the-path-startup-gate".to_string()];
        let err = supervise(&command, false).await.unwrap_err();
        assert!(matches!(err, GateError::CommandNotFound { .. }));
    }
}
