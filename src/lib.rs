#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Startup Gate
//!
//! Readiness-gated process launcher for multi-container deployments.
//!
//! ## Overview
//!
//! Containers start in whatever order the orchestrator picks, but an
//! application that connects to Postgres on boot needs Postgres to be
//! accepting connections first. The gate wraps the real command, probes its
//! dependencies until they answer, and only then hands off.
//!
//! ## Module Organization
//!
//! - [`gate`] - the waiting state machine and top-level run function
//! - [`probe`] - Postgres, Redis and TCP readiness checks
//! - [`resilience`] - retry budgets with exponential backoff and jitter
//! - [`handoff`] - supervised child process or `exec` replacement
//! - [`config`] - layered, environment-aware configuration
//! - [`deploy`] - manifest equivalence and CI gating checks
//! - [`logging`] - stderr structured logging
//! - [`error`] - error types and exit code mapping
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use startup_gate::config::GateConfig;
//! use startup_gate::gate::open_and_handoff;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GateConfig::default();
//! let command = vec!["flask".to_string(), "run".to_string()];
//! let exit_code = open_and_handoff(&config, &command).await?;
//! std::process::exit(exit_code);
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod deploy;
pub mod error;
pub mod gate;
pub mod handoff;
pub mod logging;
pub mod probe;
pub mod resilience;

pub use config::{ConfigManager, GateConfig, TargetConfig};
pub use error::{GateError, GateResult};
pub use gate::{open_and_handoff, GateReport, GateState, StartupGate};
pub use handoff::HandoffMode;
pub use probe::{ProbeKind, ReadinessProbe};
pub use resilience::RetryPolicy;
