//! # Startup Gate
//!
//! Waits until the configured dependencies accept connections, then runs the
//! given command in its place.
//!
//! ## Usage
//!
//! ```bash
//! # Wait for postgres (host `postgres`, user from PGUSER) then start the app
//! startup-gate -- flask run --host 0.0.0.0
//!
//! # Also wait for redis, give up after 20 attempts
//! startup-gate --user aggrep --redis redis:6379 --max-attempts 20 -- celery worker
//!
//! # Poll every second, forever
//! startup-gate --legacy -- ./run.sh
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{debug, error, info};

use startup_gate::config::{ConfigManager, ConfigurationError, GateConfig, TargetConfig};
use startup_gate::gate::open_and_handoff;
use startup_gate::handoff::HandoffMode;
use startup_gate::logging::{self, LogFormat};
use startup_gate::probe::ProbeKind;
use startup_gate::resilience::RetryPolicy;

#[derive(Parser, Debug)]
#[command(name = "startup-gate")]
#[command(about = "Wait for dependencies to accept connections, then run a command")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: config/startup-gate[.<env>].yaml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Environment profile (production, development, testing)
    #[arg(short, long)]
    environment: Option<String>,

    /// Kind of the primary dependency
    #[arg(long, value_name = "KIND")]
    probe: Option<ProbeKind>,

    /// Host of the primary dependency
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    /// Database role used for the postgres probe
    #[arg(short = 'U', long)]
    user: Option<String>,

    #[arg(short, long)]
    database: Option<String>,

    /// Explicit postgres URL; DATABASE_URL is never read implicitly
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Wait for a redis server, after any configured targets. Given alone, it
    /// replaces the implicit postgres target instead of adding to it
    #[arg(long = "redis", value_name = "HOST:PORT")]
    redis: Vec<String>,

    /// Wait for a TCP port; same placement rules as --redis
    #[arg(long = "tcp", value_name = "HOST:PORT")]
    tcp: Vec<String>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long, value_name = "MS")]
    max_elapsed_ms: Option<u64>,

    /// Delay after the first failed attempt
    #[arg(long, value_name = "MS")]
    interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    max_interval_ms: Option<u64>,

    #[arg(long)]
    multiplier: Option<f64>,

    /// Jitter factor between 0.0 and 1.0
    #[arg(long)]
    jitter: Option<f64>,

    /// Per-attempt connect timeout for every target
    #[arg(long, value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    /// Retry without any attempt or time limit
    #[arg(long, conflicts_with_all = ["max_attempts", "max_elapsed_ms"])]
    forever: bool,

    /// Poll every second forever with no backoff or limits
    #[arg(long, conflicts_with_all = ["max_attempts", "max_elapsed_ms", "forever"])]
    legacy: bool,

    /// Replace this process with the command instead of supervising it
    #[arg(long)]
    exec: bool,

    /// Do not relay SIGINT/SIGTERM/... to the supervised command
    #[arg(long)]
    no_forward_signals: bool,

    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Command to run once every dependency is ready
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (config, sources) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            logging::init_structured_logging(&GateConfig::default().logging);
            error!("Invalid configuration: {}", e);
            process::exit(startup_gate::GateError::from(e).exit_code());
        }
    };

    logging::init_structured_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        targets = ?config.targets.iter().map(TargetConfig::display_name).collect::<Vec<_>>(),
        "Startup gate waiting for dependencies"
    );
    debug!(sources = ?sources, config = %config.sanitized(), "Effective configuration");

    match open_and_handoff(&config, &cli.command).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{}", e);
            process::exit(e.exit_code());
        }
    }
}

fn load_config(cli: &Cli) -> Result<(GateConfig, Vec<PathBuf>), ConfigurationError> {
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from_file(path, &environment)?,
        None => ConfigManager::load_from_directory(
            &ConfigManager::default_config_directory(),
            &environment,
        )?,
    };
    let sources = manager.sources().to_vec();
    let mut config = manager.into_config();

    apply_cli_overrides(cli, &mut config)?;
    config.ensure_target();
    config.validate()?;
    Ok((config, sources))
}

fn apply_cli_overrides(cli: &Cli, config: &mut GateConfig) -> Result<(), ConfigurationError> {
    let primary_overridden = cli.probe.is_some()
        || cli.host.is_some()
        || cli.port.is_some()
        || cli.user.is_some()
        || cli.database.is_some()
        || cli.database_url.is_some();

    if primary_overridden {
        if config.targets.is_empty() {
            config.targets.push(TargetConfig::default());
        }
        let primary = &mut config.targets[0];
        if let Some(kind) = cli.probe {
            primary.kind = kind;
        }
        if cli.host.is_some() {
            primary.host = cli.host.clone();
        }
        if cli.port.is_some() {
            primary.port = cli.port;
        }
        if cli.user.is_some() {
            primary.user = cli.user.clone();
        }
        if cli.database.is_some() {
            primary.database = cli.database.clone();
        }
        if cli.database_url.is_some() {
            primary.url = cli.database_url.clone();
        }
    }

    for address in &cli.redis {
        config.targets.push(target_from_address(ProbeKind::Redis, address)?);
    }
    for address in &cli.tcp {
        config.targets.push(target_from_address(ProbeKind::Tcp, address)?);
    }

    if let Some(timeout) = cli.connect_timeout_ms {
        for target in &mut config.targets {
            target.connect_timeout_ms = timeout;
        }
    }

    let retry = &mut config.retry;
    if cli.legacy {
        *retry = RetryPolicy::legacy();
    }
    if cli.forever {
        retry.max_attempts = None;
        retry.max_elapsed_ms = None;
        retry.allow_unbounded = true;
    }
    if cli.max_attempts.is_some() {
        retry.max_attempts = cli.max_attempts;
    }
    if cli.max_elapsed_ms.is_some() {
        retry.max_elapsed_ms = cli.max_elapsed_ms;
    }
    if let Some(interval) = cli.interval_ms {
        retry.initial_interval_ms = interval;
        retry.max_interval_ms = retry.max_interval_ms.max(interval);
    }
    if let Some(max_interval) = cli.max_interval_ms {
        retry.max_interval_ms = max_interval;
    }
    if let Some(multiplier) = cli.multiplier {
        retry.multiplier = multiplier;
    }
    if let Some(jitter) = cli.jitter {
        retry.jitter_factor = jitter;
    }

    if cli.exec {
        config.handoff.mode = HandoffMode::Exec;
    }
    if cli.no_forward_signals {
        config.handoff.forward_signals = false;
    }

    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    match cli.verbose {
        0 => {}
        1 => config.logging.level = "debug".to_string(),
        _ => config.logging.level = "trace".to_string(),
    }

    Ok(())
}

fn target_from_address(kind: ProbeKind, address: &str) -> Result<TargetConfig, ConfigurationError> {
    let invalid = || {
        ConfigurationError::invalid_value(
            format!("--{kind}"),
            address,
            "expected HOST:PORT",
        )
    };
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    if host.is_empty() {
        return Err(invalid());
    }

    Ok(TargetConfig {
        kind,
        host: Some(host.to_string()),
        port: Some(port),
        ..TargetConfig::default()
    })
}
