//! # Scope Iteration
//!
//! A [`ScopePlan`] is the validated cartesian product of identity scopes and,
//! for regional kinds, deployment scopes. Iteration is identity-major: every
//! deployment of the first identity, then every deployment of the second.
//!
//! Clients are opened lazily, one per visit. An open failure is handed to the
//! caller as part of the visit rather than ending iteration, so the runner
//! can decide how far the failure reaches.

use std::collections::HashSet;

use lcw_core::{DeploymentScope, IdentityScope, ResourceKind, Scope};

use crate::client::{CloudSession, ResourceClient};
use crate::error::{EngineError, SessionError};

/// The ordered set of scopes a run visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePlan {
    kind: ResourceKind,
    identities: Vec<IdentityScope>,
    deployments: Vec<DeploymentScope>,
}

impl ScopePlan {
    /// Validate and build a plan.
    ///
    /// Regional kinds need at least one deployment scope; global kinds must
    /// not be given any. Duplicate names are rejected.
    pub fn new(
        kind: ResourceKind,
        identities: Vec<IdentityScope>,
        deployments: Vec<DeploymentScope>,
    ) -> Result<Self, EngineError> {
        if identities.is_empty() {
            return Err(EngineError::InvalidPlan(
                "at least one identity scope is required".into(),
            ));
        }
        if kind.is_regional() && deployments.is_empty() {
            return Err(EngineError::InvalidPlan(format!(
                "{kind} is regional: at least one deployment scope is required"
            )));
        }
        if !kind.is_regional() && !deployments.is_empty() {
            return Err(EngineError::InvalidPlan(format!(
                "{kind} is global: deployment scopes are not accepted"
            )));
        }
        if let Some(dup) = first_duplicate(identities.iter().map(IdentityScope::as_str)) {
            return Err(EngineError::InvalidPlan(format!(
                "identity scope '{dup}' is listed more than once"
            )));
        }
        if let Some(dup) = first_duplicate(deployments.iter().map(DeploymentScope::as_str)) {
            return Err(EngineError::InvalidPlan(format!(
                "deployment scope '{dup}' is listed more than once"
            )));
        }
        Ok(Self {
            kind,
            identities,
            deployments,
        })
    }

    /// Resource kind of the plan.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Identity scopes in visiting order.
    pub fn identities(&self) -> &[IdentityScope] {
        &self.identities
    }

    /// Deployment scopes in visiting order; empty for global kinds.
    pub fn deployments(&self) -> &[DeploymentScope] {
        &self.deployments
    }

    /// Every scope in visiting order.
    pub fn scopes(&self) -> Vec<Scope> {
        let mut out = Vec::with_capacity(self.identities.len() * self.deployments.len().max(1));
        for identity in &self.identities {
            if self.deployments.is_empty() {
                out.push(Scope::new(identity.clone(), None));
            } else {
                for deployment in &self.deployments {
                    out.push(Scope::new(identity.clone(), Some(deployment.clone())));
                }
            }
        }
        out
    }

    /// Start a pass over the plan, opening clients through `session`.
    pub fn iter<'a>(&'a self, session: &'a dyn CloudSession) -> ScopeIterator<'a> {
        ScopeIterator {
            session,
            pending: self.scopes().into_iter().collect(),
        }
    }
}

fn first_duplicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = HashSet::new();
    names.into_iter().find(|n| !seen.insert(*n))
}

/// One scope and the result of opening a client for it.
pub struct ScopeVisit {
    /// The scope being visited.
    pub scope: Scope,
    /// Client for the scope, or why it could not be built.
    pub client: Result<Box<dyn ResourceClient>, SessionError>,
}

impl std::fmt::Debug for ScopeVisit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeVisit")
            .field("scope", &self.scope)
            .field("opened", &self.client.is_ok())
            .finish()
    }
}

/// Lazy, identity-major walk over a [`ScopePlan`].
pub struct ScopeIterator<'a> {
    session: &'a dyn CloudSession,
    pending: std::collections::VecDeque<Scope>,
}

impl ScopeIterator<'_> {
    /// Drop the not-yet-visited scopes of the identity visited last and
    /// return them.
    pub fn skip_identity(&mut self, identity: &IdentityScope) -> Vec<Scope> {
        let mut skipped = Vec::new();
        while self
            .pending
            .front()
            .is_some_and(|s| &s.identity == identity)
        {
            if let Some(scope) = self.pending.pop_front() {
                skipped.push(scope);
            }
        }
        skipped
    }

    /// Drain and return every scope not yet visited.
    pub fn remaining(&mut self) -> Vec<Scope> {
        self.pending.drain(..).collect()
    }
}

impl Iterator for ScopeIterator<'_> {
    type Item = ScopeVisit;

    fn next(&mut self) -> Option<Self::Item> {
        let scope = self.pending.pop_front()?;
        tracing::debug!(
            identity = %scope.identity,
            deployment = scope.deployment_label(),
            "opening scope"
        );
        let client = self.session.open(&scope.identity, scope.deployment.as_ref());
        Some(ScopeVisit { scope, client })
    }
}
