//! Retry with exponential backoff around provider calls.
//!
//! The runner itself never retries: a transient provider error is a terminal
//! `Failed` outcome. Callers that want retries wrap their session in a
//! [`RetryingSession`], which hands out clients that retry throttling and
//! transient faults. Non-transient errors are returned immediately.

use std::time::Duration;

use lcw_core::{DeploymentScope, DesiredPolicy, IdentityScope, ObservedState, ResourceId};
use serde::{Deserialize, Serialize};

use crate::client::{CloudSession, Page, ResourceClient};
use crate::error::{ProviderError, SessionError};

/// Default number of retries after the initial call.
const MAX_RETRIES: u32 = 3;

/// Default delay before the first retry (doubles each attempt: 200ms, 400ms, 800ms).
const BASE_DELAY_MS: u64 = 200;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    MAX_RETRIES
}

fn default_base_delay_ms() -> u64 {
    BASE_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_ms: BASE_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }

    fn call<T>(
        &self,
        operation: &str,
        mut f: impl FnMut() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        for attempt in 0..self.max_retries {
            match f() {
                Err(e) if e.is_transient() => {
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        "provider call failed, retrying in {delay:?}: {e}"
                    );
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
        f()
    }
}

/// Client decorator that retries transient failures.
#[derive(Debug)]
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: ResourceClient> RetryingClient<C> {
    /// Wrap `inner`.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<C: ResourceClient> ResourceClient for RetryingClient<C> {
    fn exists(&self, id: &ResourceId) -> Result<bool, ProviderError> {
        self.policy.call("exists", || self.inner.exists(id))
    }

    fn current_state(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        self.policy.call("current_state", || self.inner.current_state(id))
    }

    fn put_desired_state(&self, id: &ResourceId, policy: &DesiredPolicy) -> Result<(), ProviderError> {
        self.policy
            .call("put_desired_state", || self.inner.put_desired_state(id, policy))
    }

    fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError> {
        self.policy.call("list_page", || self.inner.list_page(token))
    }
}

/// Session decorator whose clients retry transient failures.
#[derive(Debug)]
pub struct RetryingSession<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: CloudSession> RetryingSession<S> {
    /// Wrap `inner`.
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<S: CloudSession> CloudSession for RetryingSession<S> {
    fn open(
        &self,
        identity: &IdentityScope,
        deployment: Option<&DeploymentScope>,
    ) -> Result<Box<dyn ResourceClient>, SessionError> {
        let client = self.inner.open(identity, deployment)?;
        Ok(Box::new(RetryingClient::new(client, self.policy)))
    }

    fn describe_identity(&self, identity: &IdentityScope) -> Option<String> {
        self.inner.describe_identity(identity)
    }
}
