//! # Scope and Identifier Newtypes
//!
//! An enforcement run acts *as* an identity scope (a credential profile),
//! *in* an optional deployment scope (a region), *on* a resource identifier
//! (a bucket or log-group name). Each is a distinct type so that a region can
//! never be passed where a profile is expected.

use serde::{Deserialize, Serialize};

/// A credential reference (account profile) under which operations run.
///
/// Opaque to the engine: supplied at run start, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityScope(String);

/// A regional or locality context within an identity scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentScope(String);

/// Name of one resource instance, such as a bucket or a log group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl IdentityScope {
    /// Wrap a profile name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Access the profile name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DeploymentScope {
    /// Wrap a region name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Access the region name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ResourceId {
    /// Wrap a resource name as-is.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Parse a raw record value: surrounding whitespace is trimmed and blank
    /// values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Access the resource name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for DeploymentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work: an identity scope paired with an optional deployment
/// scope. Global resource kinds use `deployment: None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// The credential profile.
    pub identity: IdentityScope,
    /// The region, for regional resource kinds.
    pub deployment: Option<DeploymentScope>,
}

impl Scope {
    /// Build a scope.
    pub fn new(identity: IdentityScope, deployment: Option<DeploymentScope>) -> Self {
        Self {
            identity,
            deployment,
        }
    }

    /// Region name, or `"global"` for global resource kinds.
    pub fn deployment_label(&self) -> &str {
        self.deployment
            .as_ref()
            .map(DeploymentScope::as_str)
            .unwrap_or("global")
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.identity, self.deployment_label())
    }
}
