//! # Enforcement Runner
//!
//! Drives one run: for every scope in the plan, resolve targets and take
//! each through existence check, state read, comparison and (maybe) write.
//!
//! ## Failure containment
//!
//! Every attempt yields exactly one outcome, recorded in the audit log before
//! the next target starts. When an attempt fails, the configured
//! [`FailureDomain`] decides what is abandoned:
//!
//! | cause              | domain used                          |
//! |--------------------|--------------------------------------|
//! | `NotFound`         | configured                           |
//! | `ProviderRejected` | configured                           |
//! | `DiscoveryError`   | configured, at least deployment scope |
//! | `ScopeOpenFailure` | configured, at least identity scope   |
//!
//! Scopes abandoned before they start are reported as not started and
//! produce no audit records.

use lcw_core::{
    ComparisonMode, Decision, DesiredPolicy, EnforcementOutcome, Failure, FailureCause,
    FailureDomain, IdentityScope, PolicyParams, ResourceId, ResourceKind, Scope,
};
use uuid::Uuid;

use crate::audit::{AuditLog, AuditRecord};
use crate::client::{CloudSession, ResourceClient};
use crate::error::EngineError;
use crate::report::{RunReport, ScopeReport, ScopeStatus};
use crate::scopes::{ScopePlan, ScopeVisit};
use crate::targets::TargetSource;

/// A validated policy and the strategy for applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementTask {
    policy: DesiredPolicy,
    mode: ComparisonMode,
}

impl EnforcementTask {
    /// Pair a policy with a comparison mode. A conditional trigger must name
    /// a field the policy's resource kind reports.
    pub fn new(policy: DesiredPolicy, mode: ComparisonMode) -> Result<Self, EngineError> {
        mode.validate_for(policy.kind())?;
        Ok(Self { policy, mode })
    }

    /// Build the policy from parameters for `kind`, then pair it with `mode`.
    pub fn from_params(
        params: &PolicyParams,
        kind: ResourceKind,
        mode: ComparisonMode,
    ) -> Result<Self, EngineError> {
        Self::new(params.build_for(kind)?, mode)
    }

    /// The desired policy.
    pub fn policy(&self) -> &DesiredPolicy {
        &self.policy
    }

    /// The comparison mode.
    pub fn mode(&self) -> ComparisonMode {
        self.mode
    }

    /// Resource kind the task applies to.
    pub fn kind(&self) -> ResourceKind {
        self.policy.kind()
    }
}

/// Why processing of a scope stopped early.
struct Abort {
    failure: Failure,
    domain: FailureDomain,
}

/// Executes an [`EnforcementTask`] over a [`ScopePlan`].
#[derive(Debug)]
pub struct EnforcementRunner {
    run_id: Uuid,
    task: EnforcementTask,
    plan: ScopePlan,
    targets: Box<dyn TargetSource>,
    failure_domain: FailureDomain,
}

impl EnforcementRunner {
    /// Build a runner. The plan's resource kind must match the task's.
    pub fn new(
        task: EnforcementTask,
        plan: ScopePlan,
        targets: Box<dyn TargetSource>,
        failure_domain: FailureDomain,
    ) -> Result<Self, EngineError> {
        if plan.kind() != task.kind() {
            return Err(EngineError::InvalidPlan(format!(
                "plan is for {} but the {} policy applies to {}",
                plan.kind(),
                task.policy.shape_name(),
                task.kind()
            )));
        }
        Ok(Self {
            run_id: Uuid::new_v4(),
            task,
            plan,
            targets,
            failure_domain,
        })
    }

    /// Identifier stamped on every audit record of this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The configured failure domain.
    pub fn failure_domain(&self) -> FailureDomain {
        self.failure_domain
    }

    /// Execute the run.
    ///
    /// Returns `Err` only for whole-run failures (an audit write failing).
    /// Everything else is contained and reported in the [`RunReport`].
    pub fn run(
        &self,
        session: &dyn CloudSession,
        audit: &mut dyn AuditLog,
    ) -> Result<RunReport, EngineError> {
        tracing::info!(
            run_id = %self.run_id,
            failure_domain = %self.failure_domain,
            kind = %self.task.kind(),
            policy = self.task.policy.shape_name(),
            mode = ?self.task.mode,
            targets = %self.targets.describe(),
            identities = self.plan.identities().len(),
            deployments = self.plan.deployments().len(),
            "starting enforcement run: {}",
            self.failure_domain.describe()
        );

        let mut reports = Vec::new();
        let mut scopes = self.plan.iter(session);
        let mut described: Option<IdentityScope> = None;

        while let Some(visit) = scopes.next() {
            let identity = visit.scope.identity.clone();
            if described.as_ref() != Some(&identity) {
                match session.describe_identity(&identity) {
                    Some(account) => tracing::info!(identity = %identity, account = %account, "identity scope"),
                    None => tracing::warn!(identity = %identity, "could not determine account for identity scope"),
                }
                described = Some(identity.clone());
            }

            let scope_label = visit.scope.to_string();
            let mut report = ScopeReport::started(visit.scope.clone());
            let abort = self.process_scope(visit, audit, &mut report)?;
            reports.push(report);

            let Some(abort) = abort else {
                continue;
            };
            let reason = format!(
                "{} abort in {scope_label}: {}",
                abort.domain, abort.failure.cause
            );
            let abandoned = match abort.domain {
                FailureDomain::Target | FailureDomain::DeploymentScope => Vec::new(),
                FailureDomain::IdentityScope => scopes.skip_identity(&identity),
                FailureDomain::Run => scopes.remaining(),
            };
            for scope in abandoned {
                tracing::warn!(
                    identity = %scope.identity,
                    deployment = scope.deployment_label(),
                    "scope not started: {reason}"
                );
                reports.push(ScopeReport::not_started(scope, reason.clone()));
            }
            if abort.domain == FailureDomain::Run {
                break;
            }
        }

        let report = RunReport {
            run_id: self.run_id,
            failure_domain: self.failure_domain,
            scopes: reports,
        };
        tracing::info!(
            run_id = %self.run_id,
            applied = report.applied(),
            skipped = report.skipped(),
            failed = report.failed(),
            success = report.is_success(),
            "enforcement run finished"
        );
        Ok(report)
    }

    fn process_scope(
        &self,
        visit: ScopeVisit,
        audit: &mut dyn AuditLog,
        report: &mut ScopeReport,
    ) -> Result<Option<Abort>, EngineError> {
        let ScopeVisit { scope, client } = visit;

        let client = match client {
            Ok(client) => client,
            Err(e) => {
                let failure = Failure::new(FailureCause::ScopeOpenFailure, e.to_string());
                let domain = self.failure_domain.at_least(FailureDomain::IdentityScope);
                return self.abort(&scope, None, failure, domain, audit, report);
            }
        };

        tracing::info!(
            identity = %scope.identity,
            deployment = scope.deployment_label(),
            "processing scope"
        );

        for item in self.targets.resolve(client.as_ref()) {
            let target = match item {
                Ok(target) => target,
                Err(e) => {
                    let failure = Failure::new(FailureCause::DiscoveryError, e.to_string());
                    let domain = self.failure_domain.at_least(FailureDomain::DeploymentScope);
                    return self.abort(&scope, None, failure, domain, audit, report);
                }
            };

            let outcome = self.enforce(client.as_ref(), &target);
            match outcome {
                EnforcementOutcome::Failed(failure) if self.failure_domain != FailureDomain::Target => {
                    return self.abort(
                        &scope,
                        Some(target),
                        failure,
                        self.failure_domain,
                        audit,
                        report,
                    );
                }
                outcome => self.emit(&scope, Some(target), outcome, audit, report)?,
            }
        }
        Ok(None)
    }

    /// Take one target through check, read, compare and write.
    fn enforce(&self, client: &dyn ResourceClient, target: &ResourceId) -> EnforcementOutcome {
        match client.exists(target) {
            Ok(true) => {}
            Ok(false) => {
                return EnforcementOutcome::Failed(Failure::new(
                    FailureCause::NotFound,
                    format!("{target} does not exist"),
                ))
            }
            Err(e) => {
                return EnforcementOutcome::Failed(Failure::new(FailureCause::NotFound, e.to_string()))
            }
        }

        let observed = match client.current_state(target) {
            Ok(state) if state.is_absent() => {
                return EnforcementOutcome::Failed(Failure::new(
                    FailureCause::NotFound,
                    format!("{target} disappeared before its state could be read"),
                ))
            }
            Ok(state) => state,
            Err(e) => return EnforcementOutcome::Failed(Failure::new(e.read_cause(), e.to_string())),
        };

        match self.task.mode.decide(&observed, &self.task.policy) {
            Decision::Skip(reason) => EnforcementOutcome::Skipped(reason),
            Decision::Apply => match client.put_desired_state(target, &self.task.policy) {
                Ok(()) => EnforcementOutcome::Applied,
                Err(e) => EnforcementOutcome::Failed(Failure::new(
                    FailureCause::ProviderRejected,
                    e.to_string(),
                )),
            },
        }
    }

    fn abort(
        &self,
        scope: &Scope,
        target: Option<ResourceId>,
        failure: Failure,
        domain: FailureDomain,
        audit: &mut dyn AuditLog,
        report: &mut ScopeReport,
    ) -> Result<Option<Abort>, EngineError> {
        self.emit(
            scope,
            target,
            EnforcementOutcome::Failed(failure.clone()),
            audit,
            report,
        )?;
        tracing::error!(
            identity = %scope.identity,
            deployment = scope.deployment_label(),
            cause = %failure.cause,
            domain = %domain,
            "aborting {domain}: {}",
            failure.message
        );
        report.status = ScopeStatus::Aborted {
            failure: failure.clone(),
            domain,
        };
        Ok(Some(Abort { failure, domain }))
    }

    fn emit(
        &self,
        scope: &Scope,
        target: Option<ResourceId>,
        outcome: EnforcementOutcome,
        audit: &mut dyn AuditLog,
        report: &mut ScopeReport,
    ) -> Result<(), EngineError> {
        let target_label = target.as_ref().map(ResourceId::as_str).unwrap_or("-");
        match &outcome {
            EnforcementOutcome::Applied => tracing::info!(
                identity = %scope.identity,
                deployment = scope.deployment_label(),
                target = target_label,
                outcome = "applied",
                "policy applied"
            ),
            EnforcementOutcome::Skipped(reason) => tracing::info!(
                identity = %scope.identity,
                deployment = scope.deployment_label(),
                target = target_label,
                outcome = "skipped",
                "left untouched: {reason}"
            ),
            EnforcementOutcome::Failed(failure) => tracing::warn!(
                identity = %scope.identity,
                deployment = scope.deployment_label(),
                target = target_label,
                outcome = "failed",
                cause = %failure.cause,
                "{}",
                failure.message
            ),
        }
        report.count(target.as_ref(), &outcome);
        audit.record(&AuditRecord::new(self.run_id, scope.clone(), target, outcome))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::error::AuditError;
    use crate::inventory::{Inventory, InventorySession};
    use crate::targets::{DiscoveryTargets, StaticTargets};
    use lcw_core::{DeploymentScope, SkipReason, StateField};

    const LOGS: &str = r#"
identities:
  prod:
    account_id: "111111111111"
    regions:
      us-east-1:
        log_groups:
          g1: { retention_in_days: 14 }
          g2: { retention_in_days: 30 }
      eu-west-1:
        log_groups:
          g3: { retention_in_days: 14 }
  staging:
    regions:
      us-east-1:
        log_groups:
          g4: {}
      eu-west-1:
        log_groups: {}
"#;

    fn retention_task(mode: ComparisonMode) -> EnforcementTask {
        EnforcementTask::from_params(
            &PolicyParams::Retention { retention_days: 30 },
            ResourceKind::LogGroup,
            mode,
        )
        .unwrap()
    }

    fn log_plan(identities: &[&str]) -> ScopePlan {
        ScopePlan::new(
            ResourceKind::LogGroup,
            identities.iter().map(|i| IdentityScope::new(*i)).collect(),
            vec![
                DeploymentScope::new("us-east-1"),
                DeploymentScope::new("eu-west-1"),
            ],
        )
        .unwrap()
    }

    fn log_session() -> InventorySession {
        InventorySession::new(Inventory::from_yaml_str(LOGS).unwrap(), ResourceKind::LogGroup)
    }

    #[test]
    fn task_rejects_trigger_for_other_kind() {
        let err = EnforcementTask::from_params(
            &PolicyParams::Retention { retention_days: 30 },
            ResourceKind::LogGroup,
            ComparisonMode::Conditional {
                field: StateField::ExpireAfterDays,
                equals: 14,
            },
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPolicy(_)));
    }

    #[test]
    fn runner_rejects_plan_of_other_kind() {
        let plan = ScopePlan::new(ResourceKind::Bucket, vec![IdentityScope::new("prod")], vec![])
            .unwrap();
        let err = EnforcementRunner::new(
            retention_task(ComparisonMode::Unconditional),
            plan,
            Box::new(DiscoveryTargets),
            FailureDomain::Run,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidPlan(_)));
    }

    #[test]
    fn conditional_discovery_run() {
        let session = log_session();
        let runner = EnforcementRunner::new(
            retention_task(ComparisonMode::Conditional {
                field: StateField::RetentionDays,
                equals: 14,
            }),
            log_plan(&["prod", "staging"]),
            Box::new(DiscoveryTargets),
            FailureDomain::DeploymentScope,
        )
        .unwrap();
        let mut audit = MemoryAuditLog::new();
        let report = runner.run(&session, &mut audit).unwrap();

        assert!(report.is_success());
        assert_eq!(report.applied(), 2);
        assert_eq!(report.skipped(), 2);
        assert_eq!(audit.len(), 4);
        assert!(audit.records().iter().all(|r| r.run_id == runner.run_id()));
        assert!(matches!(
            audit.for_target("g2")[0].outcome,
            EnforcementOutcome::Skipped(SkipReason::TriggerMismatch {
                observed: Some(30),
                ..
            })
        ));
        assert!(matches!(
            audit.for_target("g4")[0].outcome,
            EnforcementOutcome::Skipped(SkipReason::TriggerMismatch { observed: None, .. })
        ));

        let snap = session.snapshot();
        assert_eq!(
            snap.log_group("prod", "eu-west-1", "g3").unwrap().retention_in_days,
            Some(30)
        );
    }

    #[test]
    fn scope_open_failure_abandons_identity_even_under_target_domain() {
        let session = log_session();
        let runner = EnforcementRunner::new(
            retention_task(ComparisonMode::Unconditional),
            log_plan(&["ghost", "prod"]),
            Box::new(DiscoveryTargets),
            FailureDomain::Target,
        )
        .unwrap();
        let mut audit = MemoryAuditLog::new();
        let report = runner.run(&session, &mut audit).unwrap();

        assert!(!report.is_success());
        assert_eq!(report.aborted().count(), 1);
        assert_eq!(report.not_started().count(), 1);
        assert_eq!(report.applied(), 3);
        let first = &audit.records()[0];
        assert_eq!(first.target, None);
        assert_eq!(first.cause(), Some(FailureCause::ScopeOpenFailure));
    }

    #[test]
    fn target_domain_continues_past_missing_target() {
        let session = log_session();
        let plan = ScopePlan::new(
            ResourceKind::LogGroup,
            vec![IdentityScope::new("prod")],
            vec![DeploymentScope::new("us-east-1")],
        )
        .unwrap();
        let targets = StaticTargets::from_ids(
            "mem",
            ["g1", "missing", "g2"].into_iter().map(ResourceId::new),
        );
        let runner = EnforcementRunner::new(
            retention_task(ComparisonMode::Unconditional),
            plan,
            Box::new(targets),
            FailureDomain::Target,
        )
        .unwrap();
        let mut audit = MemoryAuditLog::new();
        let report = runner.run(&session, &mut audit).unwrap();

        assert_eq!(report.applied(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.aborted().count(), 0);
        assert!(!report.is_success());
        assert_eq!(
            audit.for_target("missing")[0].cause(),
            Some(FailureCause::NotFound)
        );

        let failures = &report.scopes[0].failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].target, Some(ResourceId::new("missing")));
        let summary = report.to_string();
        assert!(summary.contains("prod/us-east-1: completed (2 applied, 0 skipped, 1 failed)"));
        assert!(summary.contains("    missing: not_found:"));
    }

    #[test]
    fn discovery_error_is_contained_to_deployment_scope() {
        let mut inv = Inventory::from_yaml_str(LOGS).unwrap();
        inv.identities
            .get_mut("prod")
            .unwrap()
            .regions
            .get_mut("us-east-1")
            .unwrap()
            .fail_listing_at_page = Some(1);
        let session = InventorySession::new(inv, ResourceKind::LogGroup).with_page_size(1);
        let runner = EnforcementRunner::new(
            retention_task(ComparisonMode::Unconditional),
            log_plan(&["prod"]),
            Box::new(DiscoveryTargets),
            FailureDomain::Target,
        )
        .unwrap();
        let mut audit = MemoryAuditLog::new();
        let report = runner.run(&session, &mut audit).unwrap();

        // g1 from page 0, then the listing fails; eu-west-1 still runs.
        assert_eq!(report.applied(), 2);
        assert!(matches!(
            &report.scopes[0].status,
            ScopeStatus::Aborted {
                failure,
                domain: FailureDomain::DeploymentScope,
            } if failure.cause == FailureCause::DiscoveryError
        ));
        assert_eq!(report.scopes[1].status, ScopeStatus::Completed);
        assert!(audit
            .records()
            .iter()
            .any(|r| r.cause() == Some(FailureCause::DiscoveryError) && r.target.is_none()));
    }

    struct BrokenAudit;

    impl AuditLog for BrokenAudit {
        fn record(&mut self, _record: &AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn audit_failure_stops_the_run() {
        let session = log_session();
        let runner = EnforcementRunner::new(
            retention_task(ComparisonMode::Unconditional),
            log_plan(&["prod"]),
            Box::new(DiscoveryTargets),
            FailureDomain::Target,
        )
        .unwrap();
        let err = runner.run(&session, &mut BrokenAudit).unwrap_err();
        assert!(matches!(err, EngineError::Audit(_)));
    }
}
