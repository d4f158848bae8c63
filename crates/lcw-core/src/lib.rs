#![deny(missing_docs)]
//! # lcw-core: Foundational Types for Lifecycle Enforcement
//!
//! Leaf crate of the workspace. Defines the vocabulary the enforcement engine
//! speaks: who a run acts as, where it acts, what it acts on, what the resource
//! should look like, and what happened when the engine tried.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for scopes and identifiers.** `IdentityScope`,
//!    `DeploymentScope` and `ResourceId` cannot be swapped for one another.
//!
//! 2. **Policies are built once.** `PolicyParams::build()` validates every run
//!    parameter and produces an immutable `DesiredPolicy` before any resource is
//!    touched. Nothing in a `DesiredPolicy` depends on a target's current state.
//!
//! 3. **Failure domains are explicit.** `FailureDomain` has no `Default`; every
//!    run must name the unit of work an error aborts.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `lcw-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod compare;
pub mod error;
pub mod kind;
pub mod outcome;
pub mod policy;
pub mod scope;
pub mod state;

pub use compare::{ComparisonMode, Decision, SkipReason, Trigger};
pub use error::PolicyError;
pub use kind::ResourceKind;
pub use outcome::{EnforcementOutcome, Failure, FailureCause, FailureDomain};
pub use policy::{
    DesiredPolicy, LifecyclePolicy, PolicyParams, RetentionPolicy, StorageClass, TransitionStep,
    VersionSchedule, ALLOWED_RETENTION_DAYS, PRESET_TRANSITION_DAYS,
};
pub use scope::{DeploymentScope, IdentityScope, ResourceId, Scope};
pub use state::{LifecycleRuleState, ObservedState, StateField};
