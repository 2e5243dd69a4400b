//! # Readiness Probes
//!
//! A probe performs one trivial connectivity check against a dependency and
//! reports whether it is ready to accept work. Probes hold no connection
//! between attempts: every call opens, checks, and drops its own.
//!
//! - [`PostgresProbe`] connects and runs `SELECT 1`
//! - [`RedisProbe`] connects and sends `PING`
//! - [`TcpProbe`] only opens a TCP connection

pub mod postgres;
pub mod redis;
pub mod tcp;

use crate::config::{ConfigResult, TargetConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use postgres::PostgresProbe;
pub use redis::RedisProbe;
pub use tcp::TcpProbe;

/// Kind of dependency a target points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Postgres,
    Redis,
    Tcp,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeKind::Postgres => write!(f, "postgres"),
            ProbeKind::Redis => write!(f, "redis"),
            ProbeKind::Tcp => write!(f, "tcp"),
        }
    }
}

impl std::str::FromStr for ProbeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(ProbeKind::Postgres),
            "redis" => Ok(ProbeKind::Redis),
            "tcp" => Ok(ProbeKind::Tcp),
            other => Err(format!(
                "unknown probe kind '{other}' (expected postgres, redis or tcp)"
            )),
        }
    }
}

/// Why a single probe attempt did not succeed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    #[error("{target}: no answer within {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("{target}: connection failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("{target}: readiness query failed: {reason}")]
    Query { target: String, reason: String },

    /// The service answered but reported that it is still starting
    #[error("{target}: not ready yet: {reason}")]
    NotReady { target: String, reason: String },

    #[error("{target}: unexpected reply: {reason}")]
    Protocol { target: String, reason: String },
}

impl ProbeError {
    pub fn connect(target: &str, reason: impl fmt::Display) -> Self {
        Self::Connect {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(target: &str, timeout: Duration) -> Self {
        Self::Timeout {
            target: target.to_string(),
            timeout,
        }
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// One connectivity check against a dependency
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Run a single attempt; `Ok(())` means the dependency is ready
    async fn probe(&self) -> ProbeResult<()>;
}

/// Build the probe matching a configured target.
pub fn build_probe(target: &TargetConfig) -> ConfigResult<Box<dyn ReadinessProbe>> {
    Ok(match target.kind {
        ProbeKind::Postgres => Box::new(PostgresProbe::from_target(target)?),
        ProbeKind::Redis => Box::new(RedisProbe::from_target(target)?),
        ProbeKind::Tcp => Box::new(TcpProbe::from_target(target)?),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scripted probes for exercising the gate without real services.

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails a fixed number of times, then succeeds forever.
    #[derive(Debug, Clone)]
    pub struct ScriptedProbe {
        name: String,
        failures_before_ready: Option<u32>,
        calls: Arc<AtomicU32>,
    }

    impl ScriptedProbe {
        pub fn ready_after(name: &str, failures: u32) -> Self {
            Self {
                name: name.to_string(),
                failures_before_ready: Some(failures),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        pub fn never_ready(name: &str) -> Self {
            Self {
                name: name.to_string(),
                failures_before_ready: None,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }

        pub fn calls(&self) -> Arc<AtomicU32> {
            Arc::clone(&self.calls)
        }
    }

    /// Hangs for `stall` on every attempt before failing.
    #[derive(Debug, Clone)]
    pub struct StalledDependency {
        pub name: String,
        pub stall: Duration,
    }

    #[async_trait]
    impl ReadinessProbe for StalledDependency {
        fn name(&self) -> &str {
            &self.name
        }

        async fn probe(&self) -> ProbeResult<()> {
            tokio::time::sleep(self.stall).await;
            Err(ProbeError::timeout(&self.name, self.stall))
        }
    }

    #[async_trait]
    impl ReadinessProbe for ScriptedProbe {
        fn name(&self) -> &str {
            &self.name
        }

        async fn probe(&self) -> ProbeResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures_before_ready {
                Some(failures) if call >= failures => Ok(()),
                _ => Err(ProbeError::connect(&self.name, "connection refused")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_kind_parsing() {
        assert_eq!("postgres".parse::<ProbeKind>(), Ok(ProbeKind::Postgres));
        assert_eq!("PG".parse::<ProbeKind>(), Ok(ProbeKind::Postgres));
        assert_eq!("redis".parse::<ProbeKind>(), Ok(ProbeKind::Redis));
        assert_eq!("tcp".parse::<ProbeKind>(), Ok(ProbeKind::Tcp));
        assert!("mysql".parse::<ProbeKind>().is_err());
    }

    #[test]
    fn test_build_probe_uses_target_name() {
        let target = TargetConfig {
            name: Some("cache".to_string()),
            kind: ProbeKind::Tcp,
            host: Some("127.0.0.1".to_string()),
            port: Some(6379),
            ..TargetConfig::default()
        };
        let probe = build_probe(&target).unwrap();
        assert_eq!(probe.name(), "cache");
    }
}
