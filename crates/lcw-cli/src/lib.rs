//! # lcw-cli: Command-Line Front End
//!
//! Provides the `lcw` binary:
//!
//! - `lcw run` loads a YAML run configuration, enforces it through the
//!   selected provider and writes a timestamped JSON-lines audit file.
//! - `lcw validate` checks a configuration and prints the resolved plan and
//!   the desired-state document without contacting any provider.
//!
//! ```bash
//! lcw validate --config tasks/log-retention.yaml
//! lcw run --config tasks/log-retention.yaml --inventory estate.yaml
//! lcw run --config tasks/s3-expire.yaml --provider aws --failure-domain run -v
//! ```
//!
//! Exit codes: 0 success, 1 the run finished with failures or aborted
//! scopes, 2 operational error.

#[cfg(feature = "aws")]
pub mod aws;
pub mod config;
pub mod run;
pub mod validate;
