//! Plain TCP reachability probe.

use super::{ProbeError, ProbeResult, ReadinessProbe};
use crate::config::{ConfigResult, ConfigurationError, TargetConfig};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

pub struct TcpProbe {
    name: String,
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn from_target(target: &TargetConfig) -> ConfigResult<Self> {
        let host = target.host.clone().ok_or_else(|| {
            ConfigurationError::missing_required_field("host", format!("tcp target '{}'", target.display_name()))
        })?;
        let port = target.port.ok_or_else(|| {
            ConfigurationError::missing_required_field("port", format!("tcp target '{}'", target.display_name()))
        })?;

        Ok(Self {
            name: target.display_name(),
            host,
            port,
            timeout: target.connect_timeout(),
        })
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> ProbeResult<()> {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::connect(&self.name, e)),
            Err(_) => Err(ProbeError::timeout(&self.name, self.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeKind;

    fn target(port: u16) -> TargetConfig {
        TargetConfig {
            kind: ProbeKind::Tcp,
            host: Some("127.0.0.1".to_string()),
            port: Some(port),
            connect_timeout_ms: 1_000,
            ..TargetConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_port_is_ready() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe::from_target(&target(port)).unwrap();
        assert_eq!(probe.probe().await, Ok(()));
    }

    #[tokio::test]
    async fn test_closed_port_fails() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = TcpProbe::from_target(&target(port)).unwrap();
        assert!(probe.probe().await.is_err());
    }

    #[test]
    fn test_host_and_port_are_required() {
        let no_port = TargetConfig {
            port: None,
            ..target(1)
        };
        assert!(TcpProbe::from_target(&no_port).is_err());

        let no_host = TargetConfig {
            host: None,
            ..target(1)
        };
        assert!(TcpProbe::from_target(&no_host).is_err());
    }
}
