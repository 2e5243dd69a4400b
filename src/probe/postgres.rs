//! Postgres readiness probe.
//!
//! Connection parameters come from the libpq environment (`PGHOST`, `PGPORT`,
//! `PGUSER`, `PGPASSWORD`, `PGDATABASE`), with explicit target settings taking
//! precedence. `DATABASE_URL` is deliberately not consulted; point the target
//! at a URL explicitly if that is what you want.

use super::{ProbeError, ProbeResult, ReadinessProbe};
use crate::config::{ConfigResult, ConfigurationError, TargetConfig};
use crate::constants::{DEFAULT_POSTGRES_HOST, DEFAULT_POSTGRES_USER, POSTGRES_PROBE_QUERY};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub struct PostgresProbe {
    name: String,
    options: PgConnectOptions,
    timeout: Duration,
}

impl PostgresProbe {
    pub fn from_target(target: &TargetConfig) -> ConfigResult<Self> {
        let options = match &target.url {
            Some(url) => {
                let parsed = PgConnectOptions::from_str(url).map_err(|e| {
                    ConfigurationError::invalid_value("targets.url", "[MASKED]", e.to_string())
                })?;
                apply_overrides(parsed, target)
            }
            None => apply_overrides(libpq_defaults(), target),
        };

        Ok(Self {
            name: target.display_name(),
            options,
            timeout: target.connect_timeout(),
        })
    }

    pub fn connect_options(&self) -> &PgConnectOptions {
        &self.options
    }
}

/// Options seeded from the libpq environment, falling back to the compose
/// service defaults for host and user.
fn libpq_defaults() -> PgConnectOptions {
    let mut options = PgConnectOptions::new();
    if std::env::var_os("PGHOST").is_none() {
        options = options.host(DEFAULT_POSTGRES_HOST);
    }
    if std::env::var_os("PGUSER").is_none() {
        options = options.username(DEFAULT_POSTGRES_USER);
    }
    options
}

fn apply_overrides(mut options: PgConnectOptions, target: &TargetConfig) -> PgConnectOptions {
    if let Some(host) = &target.host {
        options = options.host(host);
    }
    if let Some(port) = target.port {
        options = options.port(port);
    }
    if let Some(user) = &target.user {
        options = options.username(user);
    }
    if let Some(password) = &target.password {
        options = options.password(password);
    }
    if let Some(database) = &target.database {
        options = options.database(database);
    }
    options
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> ProbeResult<()> {
        let attempt = async {
            let mut conn = PgConnection::connect_with(&self.options)
                .await
                .map_err(|e| ProbeError::connect(&self.name, e))?;

            let result = sqlx::query(POSTGRES_PROBE_QUERY)
                .execute(&mut conn)
                .await
                .map(|_| ())
                .map_err(|e| ProbeError::Query {
                    target: self.name.clone(),
                    reason: e.to_string(),
                });

            if let Err(e) = conn.close().await {
                debug!(target_name = %self.name, error = %e, "Probe connection did not close cleanly");
            }

            result
        };

        tokio::time::timeout(self.timeout, attempt)
            .await
            .map_err(|_| ProbeError::timeout(&self.name, self.timeout))?
    }
}
