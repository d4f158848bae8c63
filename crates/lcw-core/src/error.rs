//! # Error Types
//!
//! Errors raised while constructing the desired state of a run. Every
//! `PolicyError` is fatal for the whole run and is raised before any scope is
//! processed. Provider and session errors live next to the traits that raise
//! them in `lcw-engine`.

use thiserror::Error;

use crate::kind::ResourceKind;
use crate::state::StateField;

/// Run parameters that cannot produce a coherent desired state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A day count was zero.
    #[error("{field} must be at least 1 day")]
    ZeroDays {
        /// The offending parameter.
        field: &'static str,
    },

    /// A transition would happen on or after the expiration it precedes.
    #[error("{versions} versions: transition after {transition_days} days must come before expiration after {expiration_days} days")]
    TransitionNotBeforeExpiration {
        /// `"current"` or `"noncurrent"`.
        versions: &'static str,
        /// Configured transition day count.
        transition_days: u32,
        /// Configured expiration day count.
        expiration_days: u32,
    },

    /// The transition-plus-year preset only accepts a fixed set of day counts.
    #[error("transition preset does not accept {0} days (choose one of 30, 60, 90, 180, 360)")]
    UnsupportedPresetDays(u32),

    /// The provider only accepts a fixed set of log retention periods.
    #[error("retention of {0} days is not an accepted retention period")]
    UnsupportedRetention(u32),

    /// A storage class name was not recognised.
    #[error("unknown storage class '{0}'")]
    UnknownStorageClass(String),

    /// The policy shape cannot be applied to this resource kind.
    #[error("{policy} policy cannot be applied to {kind} resources")]
    KindMismatch {
        /// Policy shape name.
        policy: &'static str,
        /// Resource kind of the run.
        kind: ResourceKind,
    },

    /// Conditional mode names a field this resource kind does not report.
    #[error("conditional trigger on {field} is not available for {kind} resources")]
    UnsupportedTrigger {
        /// Requested trigger field.
        field: StateField,
        /// Resource kind of the run.
        kind: ResourceKind,
    },
}
