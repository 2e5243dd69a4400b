//! Shared defaults and exit codes.

use std::time::Duration;

/// Host the gate probes when nothing else is configured; matches the
/// database service name in the compose manifests.
pub const DEFAULT_POSTGRES_HOST: &str = "postgres";
pub const DEFAULT_POSTGRES_USER: &str = "postgres";
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Polling interval of the legacy shell wrapper.
pub const LEGACY_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const DEFAULT_INITIAL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_FACTOR: f64 = 0.1;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_MAX_ELAPSED_MS: u64 = 120_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Administrative no-op used as the Postgres readiness query.
pub const POSTGRES_PROBE_QUERY: &str = "SELECT 1";

/// Prefix for environment variable overrides (`STARTUP_GATE__RETRY__MAX_ATTEMPTS`).
pub const ENV_PREFIX: &str = "STARTUP_GATE";
pub const ENV_SEPARATOR: &str = "__";

pub const CONFIG_FILE_STEM: &str = "startup-gate";

pub mod environments {
    pub const PRODUCTION: &str = "production";
    pub const DEVELOPMENT: &str = "development";
    pub const TESTING: &str = "testing";

    pub const ALL: [&str; 3] = [PRODUCTION, DEVELOPMENT, TESTING];
}

/// sysexits(3) style codes plus the shell's 126/127 launch conventions.
pub mod exit_codes {
    pub const SOFTWARE: i32 = 70;
    pub const UNAVAILABLE: i32 = 69;
    pub const IO_ERROR: i32 = 74;
    pub const CONFIG: i32 = 78;
    pub const COMMAND_NOT_EXECUTABLE: i32 = 126;
    pub const COMMAND_NOT_FOUND: i32 = 127;
    /// Offset added to a signal number when the child was killed by it.
    pub const SIGNAL_BASE: i32 = 128;
}
