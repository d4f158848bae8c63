//! # Run Report
//!
//! Summary of one enforcement run: what each scope did and why any scope
//! stopped early. The audit log holds the per-target detail.

use lcw_core::{EnforcementOutcome, Failure, FailureDomain, ResourceId, Scope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How far processing of a scope got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScopeStatus {
    /// Every target was attempted (some may have failed under the
    /// `target` domain).
    Completed,
    /// Processing stopped on a failure.
    Aborted {
        /// The failure that stopped the scope.
        failure: Failure,
        /// How far the failure reached.
        domain: FailureDomain,
    },
    /// The scope was never reached.
    NotStarted {
        /// Which scope's failure prevented it.
        reason: String,
    },
}

/// A failed outcome kept for the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    /// The target, or `None` for a scope-level failure.
    pub target: Option<ResourceId>,
    /// What went wrong.
    pub failure: Failure,
}

impl std::fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{target}: {}", self.failure),
            None => write!(f, "(scope): {}", self.failure),
        }
    }
}

/// Counters and failures for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeReport {
    /// The scope.
    pub scope: Scope,
    /// Final status.
    pub status: ScopeStatus,
    /// Targets written.
    pub applied: usize,
    /// Targets left untouched.
    pub skipped: usize,
    /// Failed outcomes, scope-level failures included.
    pub failed: usize,
    /// Every failed outcome, in the order it happened.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TargetFailure>,
}

impl ScopeReport {
    pub(crate) fn started(scope: Scope) -> Self {
        Self {
            scope,
            status: ScopeStatus::Completed,
            applied: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn not_started(scope: Scope, reason: impl Into<String>) -> Self {
        Self {
            status: ScopeStatus::NotStarted {
                reason: reason.into(),
            },
            ..Self::started(scope)
        }
    }

    pub(crate) fn count(&mut self, target: Option<&ResourceId>, outcome: &EnforcementOutcome) {
        match outcome {
            EnforcementOutcome::Applied => self.applied += 1,
            EnforcementOutcome::Skipped(_) => self.skipped += 1,
            EnforcementOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(TargetFailure {
                    target: target.cloned(),
                    failure: failure.clone(),
                });
            }
        }
    }

    /// Whether the scope stopped on a failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, ScopeStatus::Aborted { .. })
    }

    /// Whether the scope was never reached.
    pub fn is_not_started(&self) -> bool {
        matches!(self.status, ScopeStatus::NotStarted { .. })
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Identifier shared with the audit records.
    pub run_id: Uuid,
    /// The run's failure domain.
    pub failure_domain: FailureDomain,
    /// One entry per planned scope, in plan order.
    pub scopes: Vec<ScopeReport>,
}

impl RunReport {
    /// Total targets written.
    pub fn applied(&self) -> usize {
        self.scopes.iter().map(|s| s.applied).sum()
    }

    /// Total targets left untouched.
    pub fn skipped(&self) -> usize {
        self.scopes.iter().map(|s| s.skipped).sum()
    }

    /// Total failed outcomes.
    pub fn failed(&self) -> usize {
        self.scopes.iter().map(|s| s.failed).sum()
    }

    /// Scopes that stopped on a failure.
    pub fn aborted(&self) -> impl Iterator<Item = &ScopeReport> {
        self.scopes.iter().filter(|s| s.is_aborted())
    }

    /// Scopes never reached.
    pub fn not_started(&self) -> impl Iterator<Item = &ScopeReport> {
        self.scopes.iter().filter(|s| s.is_not_started())
    }

    /// True only when nothing failed and every scope ran to completion.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
            && self
                .scopes
                .iter()
                .all(|s| s.status == ScopeStatus::Completed)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "run {}: {} applied, {} skipped, {} failed (failure domain: {})",
            self.run_id,
            self.applied(),
            self.skipped(),
            self.failed(),
            self.failure_domain
        )?;
        for s in &self.scopes {
            match &s.status {
                ScopeStatus::Completed => writeln!(
                    f,
                    "  {}: completed ({} applied, {} skipped, {} failed)",
                    s.scope, s.applied, s.skipped, s.failed
                )?,
                ScopeStatus::Aborted { failure, domain } => writeln!(
                    f,
                    "  {}: aborted at {domain} level after {} applied, {} skipped: {failure}",
                    s.scope, s.applied, s.skipped
                )?,
                ScopeStatus::NotStarted { reason } => {
                    writeln!(f, "  {}: not started ({reason})", s.scope)?
                }
            }
            for failure in &s.failures {
                writeln!(f, "    {failure}")?;
            }
        }
        Ok(())
    }
}
