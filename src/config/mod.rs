//! # Startup Gate Configuration
//!
//! Everything the gate needs to know: which dependencies to wait for, how
//! patiently, how to hand off, and how to log while doing so.
//!
//! ## Architecture
//!
//! - **Layered**: built-in defaults, then YAML/TOML files, then
//!   `STARTUP_GATE__*` environment variables, then CLI flags
//! - **Environment Aware**: `production`, `development` and `testing`
//!   profiles, detected from `STARTUP_GATE_ENV`, `FLASK_ENV` or `APP_ENV`
//! - **Explicit Validation**: invalid values are rejected at load time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use startup_gate::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retry = &manager.config().retry;
//! println!("waiting at most {:?} attempts", retry.max_attempts);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{environments, DEFAULT_CONNECT_TIMEOUT_MS};
use crate::handoff::HandoffMode;
use crate::logging::LogFormat;
use crate::probe::ProbeKind;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GateConfig {
    /// Deployment environment this configuration was resolved for
    pub environment: String,

    /// Dependencies to wait for, in order; absent means none configured
    #[serde(default)]
    pub targets: Vec<TargetConfig>,

    pub retry: RetryPolicy,

    pub handoff: HandoffConfig,

    pub logging: LoggingConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::for_environment(environments::PRODUCTION)
    }
}

impl GateConfig {
    /// Built-in defaults for an environment profile.
    pub fn for_environment(environment: &str) -> Self {
        let level = match environment {
            environments::PRODUCTION => "info",
            _ => "debug",
        };

        Self {
            environment: environment.to_string(),
            targets: vec![TargetConfig::default()],
            retry: RetryPolicy::default(),
            handoff: HandoffConfig::default(),
            logging: LoggingConfig {
                level: level.to_string(),
                format: LogFormat::default(),
            },
        }
    }

    /// Fall back to the conventional `postgres` service when no dependency is configured.
    pub fn ensure_target(&mut self) {
        if self.targets.is_empty() {
            self.targets.push(TargetConfig::default());
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.targets.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "targets",
                "gate configuration (at least one dependency is required)",
            ));
        }
        self.validate_settings()
    }

    /// Everything [`GateConfig::validate`] checks except that targets exist
    fn validate_settings(&self) -> ConfigResult<()> {
        for target in &self.targets {
            target.validate()?;
        }
        self.retry.validate()?;

        #[cfg(not(unix))]
        {
            if self.handoff.mode == HandoffMode::Exec {
                return Err(ConfigurationError::invalid_value(
                    "handoff.mode",
                    "exec",
                    "process replacement is only available on unix",
                ));
            }
        }

        Ok(())
    }

    /// Configuration as JSON with credentials masked, safe for logs.
    pub fn sanitized(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        sanitize_json_recursive(&mut value, &SENSITIVE_PATTERNS);
        value
    }
}

const SENSITIVE_PATTERNS: [&str; 5] = ["password", "secret", "token", "credential", "url"];

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if is_sensitive {
                    if !val.is_null() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    }
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

/// A single dependency the gate waits for
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Label used in diagnostics; derived from kind and address when unset
    pub name: Option<String>,
    pub kind: ProbeKind,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Explicit connection URL (postgres only); never read from `DATABASE_URL` implicitly
    pub url: Option<String>,
    /// Per-attempt limit covering connect and readiness check
    pub connect_timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: None,
            kind: ProbeKind::Postgres,
            host: None,
            port: None,
            user: None,
            password: None,
            database: None,
            url: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl TargetConfig {
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match (&self.host, self.port) {
            (Some(host), Some(port)) => format!("{}://{host}:{port}", self.kind),
            (Some(host), None) => format!("{}://{host}", self.kind),
            _ => self.kind.to_string(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.connect_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "targets.connect_timeout_ms",
                0,
                format!("target '{}' needs a positive timeout", self.display_name()),
            ));
        }
        if self.kind == ProbeKind::Tcp && (self.host.is_none() || self.port.is_none()) {
            return Err(ConfigurationError::missing_required_field(
                "host and port",
                format!("tcp target '{}'", self.display_name()),
            ));
        }
        if self.url.is_some() && self.kind != ProbeKind::Postgres {
            return Err(ConfigurationError::invalid_value(
                "targets.url",
                "[MASKED]",
                format!("only postgres targets accept a url, '{}' is {}", self.display_name(), self.kind),
            ));
        }
        Ok(())
    }
}

/// How control passes to the wrapped command once the gate opens
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub mode: HandoffMode,
    /// Relay termination signals to the child in supervise mode
    pub forward_signals: bool,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            mode: HandoffMode::Supervise,
            forward_signals: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_differ_only_in_log_level() {
        let production = GateConfig::for_environment("production");
        let development = GateConfig::for_environment("development");
        let testing = GateConfig::for_environment("testing");

        assert_eq!(production.logging.level, "info");
        assert_eq!(development.logging.level, "debug");
        assert_eq!(testing.logging.level, "debug");
        assert_eq!(production.retry, development.retry);
        assert_eq!(production.targets, testing.targets);
    }

    #[test]
    fn test_default_targets_postgres() {
        let config = GateConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].kind, ProbeKind::Postgres);
        assert_eq!(config.targets[0].display_name(), "postgres");
    }

    #[test]
    fn test_empty_targets_rejected() {
        let config = GateConfig {
            targets: vec![],
            ..GateConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_missing_targets_key_means_no_targets() {
        let config: GateConfig = serde_yaml::from_str("retry:\n  max_attempts: 3\n").unwrap();
        assert!(config.targets.is_empty());
        assert_eq!(config.retry.max_attempts, Some(3));
    }

    #[test]
    fn test_ensure_target_only_fills_empty() {
        let mut config = GateConfig {
            targets: vec![],
            ..GateConfig::default()
        };
        config.ensure_target();
        assert_eq!(config.targets, vec![TargetConfig::default()]);

        let redis = TargetConfig {
            kind: ProbeKind::Redis,
            ..TargetConfig::default()
        };
        let mut config = GateConfig {
            targets: vec![redis.clone()],
            ..GateConfig::default()
        };
        config.ensure_target();
        assert_eq!(config.targets, vec![redis]);
    }

    #[test]
    fn test_tcp_target_needs_address() {
        let target = TargetConfig {
            kind: ProbeKind::Tcp,
            host: Some("redis".to_string()),
            ..TargetConfig::default()
        };
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_url_only_for_postgres() {
        let target = TargetConfig {
            kind: ProbeKind::Redis,
            url: Some("redis://redis:6379".to_string()),
            ..TargetConfig::default()
        };
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_display_name_derivation() {
        let target = TargetConfig {
            kind: ProbeKind::Redis,
            host: Some("redis".to_string()),
            port: Some(6379),
            ..TargetConfig::default()
        };
        assert_eq!(target.display_name(), "redis://redis:6379");

        let named = TargetConfig {
            name: Some("cache".to_string()),
            ..target
        };
        assert_eq!(named.display_name(), "cache");
    }

    #[test]
    fn test_sanitized_masks_credentials() {
        let mut config = GateConfig::default();
        config.targets[0].password = Some("hunter2".to_string());
        config.targets[0].url = Some("postgres://u:hunter2@db/app".to_string());

        let sanitized = config.sanitized();
        let rendered = sanitized.to_string();
        assert!(!rendered.contains("hunter2"));
        assert_eq!(sanitized["targets"][0]["password"], "[MASKED]");
        assert!(sanitized["targets"][0]["user"].is_null());
    }
}
