//! # Outcomes and Failure Domains
//!
//! Every (scope, target) attempt produces exactly one `EnforcementOutcome`.
//! When an attempt fails, the run's `FailureDomain` decides how much of the
//! remaining work is abandoned.

use serde::{Deserialize, Serialize};

use crate::compare::SkipReason;

// ---------------------------------------------------------------------------
// FailureDomain
// ---------------------------------------------------------------------------

/// The unit of work an error aborts.
///
/// Variants are ordered from narrowest to widest, so `max` picks the wider
/// of two domains. Has no `Default`; callers must choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDomain {
    /// Only the failing target is abandoned; the next target is processed.
    Target,
    /// The rest of the current deployment scope is abandoned; sibling
    /// deployment scopes of the same identity continue.
    DeploymentScope,
    /// The rest of the current identity scope is abandoned; sibling
    /// identity scopes continue.
    IdentityScope,
    /// The whole run stops.
    Run,
}

impl FailureDomain {
    /// All domains, narrowest first.
    pub const ALL: [FailureDomain; 4] = [
        Self::Target,
        Self::DeploymentScope,
        Self::IdentityScope,
        Self::Run,
    ];

    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::DeploymentScope => "deployment_scope",
            Self::IdentityScope => "identity_scope",
            Self::Run => "run",
        }
    }

    /// One-line description of what a failure abandons under this domain.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Target => "a failure abandons only the failing target",
            Self::DeploymentScope => {
                "a failure abandons the rest of its deployment scope; sibling deployment scopes continue"
            }
            Self::IdentityScope => {
                "a failure abandons the rest of its identity scope; sibling identity scopes continue"
            }
            Self::Run => "any failure stops the whole run",
        }
    }

    /// Widen this domain to at least `floor`.
    pub fn at_least(self, floor: FailureDomain) -> FailureDomain {
        self.max(floor)
    }
}

impl std::fmt::Display for FailureDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown failure domain '{s}' (expected target, deployment_scope, identity_scope or run)"
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The client for an identity/deployment pair could not be built.
    ScopeOpenFailure,
    /// The target is absent or inaccessible.
    NotFound,
    /// Listing targets failed part-way through.
    DiscoveryError,
    /// The provider refused a read or a write.
    ProviderRejected,
}

impl FailureCause {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScopeOpenFailure => "scope_open_failure",
            Self::NotFound => "not_found",
            Self::DiscoveryError => "discovery_error",
            Self::ProviderRejected => "provider_rejected",
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed attempt with the provider's explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// What kind of failure this was.
    pub cause: FailureCause,
    /// Provider or session message.
    pub message: String,
}

impl Failure {
    /// Build a failure.
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.cause, self.message)
    }
}

/// What happened to one target in one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum EnforcementOutcome {
    /// The desired policy was written.
    Applied,
    /// The target was left untouched.
    Skipped(SkipReason),
    /// The attempt failed.
    Failed(Failure),
}

impl EnforcementOutcome {
    /// Short label for logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped(_) => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}
