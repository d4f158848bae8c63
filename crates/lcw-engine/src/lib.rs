#![deny(missing_docs)]
//! # lcw-engine: Bulk Policy Enforcement
//!
//! Converges an inventory of cloud resources toward a desired policy across
//! one or more identity scopes (credential profiles) and, for regional
//! resource kinds, multiple deployment scopes (regions).
//!
//! ## Flow
//!
//! ```text
//! ScopeIterator ──▶ per scope: TargetSource ──▶ per target:
//!     exists? ──▶ current_state ──▶ ComparisonMode::decide ──▶ put_desired_state
//!                                                   │
//!                                                   ▼
//!                                               AuditLog
//! ```
//!
//! `EnforcementRunner` supervises the flow and contains failures inside the
//! run's `FailureDomain`. Execution is sequential: identities one at a time,
//! deployments within an identity one at a time, targets one at a time.
//!
//! ## Collaborators
//!
//! - [`CloudSession`] opens one [`ResourceClient`] per scope. Credential and
//!   request-signing details live behind it.
//! - [`AuditLog`] receives every outcome synchronously, before the next
//!   target is processed.
//!
//! The engine never retries. [`retry::RetryingSession`] layers a retry
//! policy around any session for callers that want one.

pub mod audit;
pub mod client;
pub mod error;
pub mod inventory;
pub mod report;
pub mod retry;
pub mod runner;
pub mod scopes;
pub mod targets;

pub use audit::{AuditLog, AuditRecord, JsonLinesAuditLog, MemoryAuditLog};
pub use client::{CloudSession, Page, ResourceClient};
pub use error::{AuditError, EngineError, ProviderError, SessionError};
pub use inventory::{Inventory, InventoryError, InventorySession};
pub use report::{RunReport, ScopeReport, ScopeStatus, TargetFailure};
pub use retry::{RetryPolicy, RetryingClient, RetryingSession};
pub use runner::{EnforcementRunner, EnforcementTask};
pub use scopes::{ScopeIterator, ScopePlan, ScopeVisit};
pub use targets::{DiscoveryTargets, StaticTargets, TargetSource};
