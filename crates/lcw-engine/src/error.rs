//! # Engine Error Types
//!
//! Three layers of failure:
//!
//! - [`ProviderError`] and [`SessionError`] come from collaborators. The
//!   runner turns them into `Failed` outcomes and contains them within the
//!   run's failure domain.
//! - [`AuditError`] means an outcome could not be recorded.
//! - [`EngineError`] is fatal for the whole run and is returned from
//!   `EnforcementRunner::run` (or raised before it starts).

use lcw_core::{FailureCause, PolicyError};
use thiserror::Error;

/// Error returned by a [`ResourceClient`](crate::ResourceClient) call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The resource does not exist.
    #[error("{resource} does not exist")]
    NotFound {
        /// Resource name.
        resource: String,
    },

    /// The caller's identity may not access the resource.
    #[error("access to {resource} denied: {message}")]
    AccessDenied {
        /// Resource name.
        resource: String,
        /// Provider message.
        message: String,
    },

    /// The provider refused the request.
    #[error("provider rejected request for {resource}: {message}")]
    Rejected {
        /// Resource name, or the operation for listing calls.
        resource: String,
        /// Provider message.
        message: String,
    },

    /// The provider is rate-limiting the caller.
    #[error("request throttled: {message}")]
    Throttled {
        /// Provider message.
        message: String,
    },

    /// Network or service fault that may succeed on a later attempt.
    #[error("transient provider error: {message}")]
    Transient {
        /// Provider message.
        message: String,
    },

    /// The client cannot perform this operation for its resource kind.
    #[error("{operation} is not supported by this client")]
    Unsupported {
        /// Operation name.
        operation: String,
    },
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Transient { .. })
    }

    /// Failure cause when a state read fails.
    pub fn read_cause(&self) -> FailureCause {
        match self {
            Self::NotFound { .. } | Self::AccessDenied { .. } => FailureCause::NotFound,
            _ => FailureCause::ProviderRejected,
        }
    }
}

/// Error returned when a client for a scope cannot be constructed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The identity scope is not known to the session.
    #[error("unknown identity scope '{identity}'")]
    UnknownIdentity {
        /// Identity scope name.
        identity: String,
    },

    /// The deployment scope is not known for this identity.
    #[error("unknown deployment scope '{deployment}' for identity '{identity}'")]
    UnknownDeployment {
        /// Identity scope name.
        identity: String,
        /// Deployment scope name.
        deployment: String,
    },

    /// Credentials for the identity could not be loaded.
    #[error("could not load credentials for '{identity}': {message}")]
    Credentials {
        /// Identity scope name.
        identity: String,
        /// Loader message.
        message: String,
    },

    /// The session requires a deployment scope and none was given, or the
    /// other way round.
    #[error("scope shape mismatch: {0}")]
    ScopeShape(String),
}

/// Error writing an audit record.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The sink could not be written.
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),

    /// The record could not be serialized.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fatal, whole-run error.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The static target list could not be read at all.
    #[error("target source {location} unavailable: {reason}")]
    SourceUnavailable {
        /// Path or label of the source.
        location: String,
        /// Why it could not be read.
        reason: String,
    },

    /// Run parameters do not produce a coherent policy.
    #[error("invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    /// The identity/deployment plan is unusable.
    #[error("invalid scope plan: {0}")]
    InvalidPlan(String),

    /// An outcome could not be recorded.
    #[error("audit log failure: {0}")]
    Audit(#[from] AuditError),
}
