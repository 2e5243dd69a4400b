//! # Resilience Module
//!
//! Retry budgets and backoff for waiting on dependencies that are still
//! starting up.
//!
//! ## Usage
//!
//! ```rust
//! use startup_gate::resilience::RetryPolicy;
//!
//! let policy = RetryPolicy {
//!     max_attempts: Some(10),
//!     ..RetryPolicy::default()
//! };
//! assert!(policy.validate().is_ok());
//! assert!(policy.attempts_remaining(9));
//! assert!(!policy.attempts_remaining(10));
//! ```

pub mod backoff;

pub use backoff::RetryPolicy;
