//! Redis readiness probe: `AUTH` when a password is configured, then `PING`.

use super::{ProbeError, ProbeResult, ReadinessProbe};
use crate::config::{ConfigResult, ConfigurationError, TargetConfig};
use crate::constants::DEFAULT_REDIS_PORT;
use async_trait::async_trait;
use redis::RedisError;
use std::time::Duration;

/// Error codes a Redis server uses while it cannot serve requests yet
const NOT_READY_CODES: [&str; 3] = ["LOADING", "BUSY", "MASTERDOWN"];

pub struct RedisProbe {
    name: String,
    client: redis::Client,
    password: Option<String>,
    timeout: Duration,
}

impl RedisProbe {
    pub fn from_target(target: &TargetConfig) -> ConfigResult<Self> {
        let host = target.host.as_deref().unwrap_or("redis");
        let port = target.port.unwrap_or(DEFAULT_REDIS_PORT);
        let url = if host.contains(':') {
            format!("redis://[{host}]:{port}/")
        } else {
            format!("redis://{host}:{port}/")
        };
        let client = redis::Client::open(url.as_str())
            .map_err(|e| ConfigurationError::invalid_value("targets.host", host, e.to_string()))?;

        Ok(Self {
            name: target.display_name(),
            client,
            password: target.password.clone(),
            timeout: target.connect_timeout(),
        })
    }

    async fn exchange(&self) -> ProbeResult<()> {
        let mut connection = match self.client.get_multiplexed_async_connection().await {
            Ok(connection) => connection,
            Err(e) => return self.classify(e),
        };

        if let Some(password) = &self.password {
            if let Err(e) = redis::cmd("AUTH")
                .arg(password)
                .query_async::<()>(&mut connection)
                .await
            {
                // A rejected password still proves the server is accepting connections
                self.classify(e)?;
            }
        }

        match redis::cmd("PING").query_async::<String>(&mut connection).await {
            Ok(_) => Ok(()),
            Err(e) => self.classify(e),
        }
    }

    /// Any answer from the server counts as ready unless it says it is still starting.
    fn classify(&self, error: RedisError) -> ProbeResult<()> {
        if error.is_io_error()
            || error.is_timeout()
            || error.is_connection_refusal()
            || error.is_connection_dropped()
        {
            return Err(ProbeError::connect(&self.name, error));
        }

        match error.code() {
            Some(code) if NOT_READY_CODES.contains(&code) => Err(ProbeError::NotReady {
                target: self.name.clone(),
                reason: error.to_string(),
            }),
            Some(_) => Ok(()),
            None => Err(ProbeError::Protocol {
                target: self.name.clone(),
                reason: error.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ReadinessProbe for RedisProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> ProbeResult<()> {
        tokio::time::timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| ProbeError::timeout(&self.name, self.timeout))?
    }
}
