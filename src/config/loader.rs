//! Configuration Loader
//!
//! Environment-aware, layered configuration loading built on the `config`
//! crate. Sources are applied lowest precedence first:
//!
//! 1. Built-in profile defaults ([`GateConfig::for_environment`])
//! 2. `startup-gate.{yaml,yml,toml}` in the configuration directory
//! 3. `startup-gate.<environment>.{yaml,yml,toml}` in the same directory
//! 4. `STARTUP_GATE__<SECTION>__<KEY>` environment variables
//!
//! The loaded configuration may have no targets; callers add command-line
//! targets and then call [`GateConfig::ensure_target`] before validating.

use super::error::{ConfigResult, ConfigurationError};
use super::GateConfig;
use crate::constants::{environments, CONFIG_FILE_STEM, ENV_PREFIX, ENV_SEPARATOR};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_EXTENSIONS: [&str; 3] = ["yaml", "yml", "toml"];

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: GateConfig,
    environment: String,
    sources: Vec<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from the default directory
    pub fn load() -> ConfigResult<ConfigManager> {
        let environment = Self::detect_environment();
        Self::load_from_directory(&Self::default_config_directory(), &environment)
    }

    /// Load base and environment-specific files from `config_dir`; missing files are skipped
    pub fn load_from_directory(config_dir: &Path, environment: &str) -> ConfigResult<ConfigManager> {
        Self::builder(environment).directory(config_dir).load()
    }

    /// Load a single explicitly named file, which must exist
    pub fn load_from_file(path: &Path, environment: &str) -> ConfigResult<ConfigManager> {
        Self::builder(environment).file(path).load()
    }

    pub fn builder(environment: &str) -> ConfigManagerBuilder {
        ConfigManagerBuilder {
            environment: environment.to_lowercase(),
            files: Vec::new(),
            env_overrides: None,
            missing: Vec::new(),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GateConfig {
        &mut self.config
    }

    pub fn into_config(self) -> GateConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Files that contributed to this configuration, in load order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Detect current environment: STARTUP_GATE_ENV || FLASK_ENV || APP_ENV || 'production'
    pub fn detect_environment() -> String {
        env::var("STARTUP_GATE_ENV")
            .or_else(|_| env::var("FLASK_ENV"))
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| environments::PRODUCTION.to_string())
            .to_lowercase()
    }

    /// `STARTUP_GATE_CONFIG_DIR`, or `config` relative to the working directory
    pub fn default_config_directory() -> PathBuf {
        env::var_os("STARTUP_GATE_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config"))
    }
}

/// Builder for a [`ConfigManager`] with explicit sources
#[derive(Debug)]
pub struct ConfigManagerBuilder {
    environment: String,
    files: Vec<PathBuf>,
    env_overrides: Option<HashMap<String, String>>,
    missing: Vec<PathBuf>,
}

impl ConfigManagerBuilder {
    /// Add the base and environment files found in `dir`
    pub fn directory(mut self, dir: &Path) -> Self {
        let stems = [
            CONFIG_FILE_STEM.to_string(),
            format!("{CONFIG_FILE_STEM}.{}", self.environment),
        ];
        for stem in stems {
            let found = CONFIG_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{stem}.{ext}")))
                .find(|candidate| candidate.is_file());
            if let Some(path) = found {
                self.files.push(path);
            }
        }
        self
    }

    /// Add a required file
    pub fn file(mut self, path: &Path) -> Self {
        if path.is_file() {
            self.files.push(path.to_path_buf());
        } else {
            self.missing.push(path.to_path_buf());
        }
        self
    }

    /// Use this map instead of the process environment for `STARTUP_GATE__*` overrides
    pub fn env_overrides(mut self, vars: HashMap<String, String>) -> Self {
        self.env_overrides = Some(vars);
        self
    }

    pub fn load(self) -> ConfigResult<ConfigManager> {
        if let Some(path) = self.missing.into_iter().next() {
            return Err(ConfigurationError::ConfigFileNotFound { path });
        }

        if !environments::ALL.contains(&self.environment.as_str()) {
            warn!(
                environment = %self.environment,
                "Unknown environment, using non-production defaults"
            );
        }

        // Targets come only from files and the environment: list sources merge
        // element-wise, so seeding a default target would leak into them.
        let mut defaults = GateConfig::for_environment(&self.environment);
        defaults.targets.clear();
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        for file in &self.files {
            debug!(file = %file.display(), "Adding configuration file");
            builder = builder.add_source(config::File::from(file.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true)
                .source(self.env_overrides),
        );

        let mut config: GateConfig = builder.build()?.try_deserialize()?;
        config.environment = self.environment.clone();
        config.validate_settings()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&config.sanitized())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(ConfigManager {
            config,
            environment: self.environment,
            sources: self.files,
        })
    }
}
