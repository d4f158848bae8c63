//! # Run Configuration
//!
//! A run is described by a YAML document:
//!
//! ```yaml
//! name: log-retention-14-to-30
//! kind: log_group
//! identities: [prod, staging]
//! regions: [us-east-1, us-west-2]
//! targets: { source: discover }            # or { source: file, path: groups.csv }
//! policy: { shape: retention, retention_days: 30 }
//! mode: { type: conditional, field: retention_days, equals: 14 }
//! failure_domain: deployment_scope
//! audit_dir: logs
//! retry: { max_retries: 3, base_delay_ms: 200 }
//! ```
//!
//! Loading only parses. [`RunConfig::resolve`] applies command-line
//! overrides and validates everything (policy, trigger, scope plan, failure
//! domain) before any provider is contacted.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use lcw_core::{ComparisonMode, DeploymentScope, FailureDomain, IdentityScope, PolicyParams, ResourceKind};
use lcw_engine::{
    DiscoveryTargets, EnforcementTask, RetryPolicy, ScopePlan, StaticTargets, TargetSource,
};

/// Where a run's targets come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TargetsConfig {
    /// List resources in each scope.
    Discover,
    /// Read names from a record-per-line file shared by every scope.
    File {
        /// Path to the list.
        path: PathBuf,
    },
}

fn default_mode() -> ComparisonMode {
    ComparisonMode::Unconditional
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// A run configuration as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Task name; used for the audit file name.
    pub name: String,
    /// Resource kind to enforce on.
    pub kind: ResourceKind,
    /// Identity scopes (credential profiles), in processing order.
    pub identities: Vec<String>,
    /// Deployment scopes (regions). Required for regional kinds only.
    #[serde(default)]
    pub regions: Vec<String>,
    /// Target source.
    pub targets: TargetsConfig,
    /// Policy parameters.
    pub policy: PolicyParams,
    /// Comparison mode; unconditional when omitted.
    #[serde(default = "default_mode")]
    pub mode: ComparisonMode,
    /// Failure domain. Must be given here or on the command line.
    #[serde(default)]
    pub failure_domain: Option<FailureDomain>,
    /// Directory for the per-run audit file.
    #[serde(default = "default_audit_dir")]
    pub audit_dir: PathBuf,
    /// Retry decorator settings; no retries when omitted.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Replaces `failure_domain`.
    pub failure_domain: Option<FailureDomain>,
    /// Replaces `targets` with a file source.
    pub targets: Option<PathBuf>,
    /// Replaces `audit_dir`.
    pub audit_dir: Option<PathBuf>,
}

/// A fully validated run.
#[derive(Debug)]
pub struct ResolvedRun {
    /// Task name.
    pub name: String,
    /// Policy and comparison mode.
    pub task: EnforcementTask,
    /// Scopes to visit.
    pub plan: ScopePlan,
    /// Target source.
    pub targets: TargetsConfig,
    /// Failure domain.
    pub failure_domain: FailureDomain,
    /// Directory for the audit file.
    pub audit_dir: PathBuf,
    /// Retry settings, if any.
    pub retry: Option<RetryPolicy>,
}

impl RunConfig {
    /// Parse a configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("invalid run configuration")
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run configuration {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Apply overrides and validate.
    pub fn resolve(self, overrides: &Overrides) -> Result<ResolvedRun> {
        let Some(failure_domain) = overrides.failure_domain.or(self.failure_domain) else {
            bail!(
                "failure_domain is required (one of target, deployment_scope, identity_scope, run); \
                 set it in the configuration or pass --failure-domain"
            );
        };

        let task = EnforcementTask::from_params(&self.policy, self.kind, self.mode)
            .context("policy parameters rejected")?;

        let plan = ScopePlan::new(
            self.kind,
            self.identities.into_iter().map(IdentityScope::new).collect(),
            self.regions.into_iter().map(DeploymentScope::new).collect(),
        )
        .context("scope plan rejected")?;

        let targets = match &overrides.targets {
            Some(path) => TargetsConfig::File { path: path.clone() },
            None => self.targets,
        };

        Ok(ResolvedRun {
            name: self.name,
            task,
            plan,
            targets,
            failure_domain,
            audit_dir: overrides.audit_dir.clone().unwrap_or(self.audit_dir),
            retry: self.retry,
        })
    }
}

impl ResolvedRun {
    /// Build the target source. A static list is read here, once, and an
    /// unreadable list fails the whole run.
    pub fn target_source(&self) -> Result<Box<dyn TargetSource>> {
        match &self.targets {
            TargetsConfig::Discover => Ok(Box::new(DiscoveryTargets)),
            TargetsConfig::File { path } => {
                let list = StaticTargets::from_path(path).context("cannot read target list")?;
                Ok(Box::new(list))
            }
        }
    }
}
