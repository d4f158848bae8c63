//! # Provider Collaborators
//!
//! The engine talks to cloud providers only through these two traits. A
//! `CloudSession` turns an (identity, deployment) pair into a
//! `ResourceClient`; the client performs existence checks, state reads,
//! writes, and paginated listing for one resource kind.

use lcw_core::{DeploymentScope, DesiredPolicy, IdentityScope, ObservedState, ResourceId};

use crate::error::{ProviderError, SessionError};

/// One page of a discovery listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Resource names on this page, in provider order.
    pub items: Vec<ResourceId>,
    /// Token for the next page, or `None` when the listing is complete.
    pub next_token: Option<String>,
}

/// Operations on resources of one kind within one scope.
///
/// All calls are synchronous and block until the provider answers.
pub trait ResourceClient {
    /// Whether the resource exists and is reachable.
    fn exists(&self, id: &ResourceId) -> Result<bool, ProviderError>;

    /// Read the resource's current configuration.
    fn current_state(&self, id: &ResourceId) -> Result<ObservedState, ProviderError>;

    /// Write the desired configuration.
    fn put_desired_state(&self, id: &ResourceId, policy: &DesiredPolicy) -> Result<(), ProviderError>;

    /// Fetch one page of resource names. `None` requests the first page.
    fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError>;
}

impl<C: ResourceClient + ?Sized> ResourceClient for Box<C> {
    fn exists(&self, id: &ResourceId) -> Result<bool, ProviderError> {
        (**self).exists(id)
    }

    fn current_state(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        (**self).current_state(id)
    }

    fn put_desired_state(&self, id: &ResourceId, policy: &DesiredPolicy) -> Result<(), ProviderError> {
        (**self).put_desired_state(id, policy)
    }

    fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError> {
        (**self).list_page(token)
    }
}

/// Source of per-scope clients.
pub trait CloudSession {
    /// Build a client for an identity scope and, for regional kinds, a
    /// deployment scope.
    fn open(
        &self,
        identity: &IdentityScope,
        deployment: Option<&DeploymentScope>,
    ) -> Result<Box<dyn ResourceClient>, SessionError>;

    /// Account identifier behind an identity scope, when the provider can
    /// tell. Used for logging only.
    fn describe_identity(&self, _identity: &IdentityScope) -> Option<String> {
        None
    }
}
