//! # Run Subcommand
//!
//! Loads a run configuration, builds the session for the selected provider,
//! executes the run and prints a summary. Every outcome is written to a
//! timestamped JSON-lines audit file.
//!
//! Exit codes: 0 when every scope completed without a failed outcome, 1 when
//! the run finished with failures or aborted scopes, 2 on operational errors
//! (reported by the caller).

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, ValueEnum};

use lcw_core::FailureDomain;
use lcw_engine::audit::audit_file_name;
use lcw_engine::{
    CloudSession, EnforcementRunner, Inventory, InventorySession, JsonLinesAuditLog, RetryPolicy,
    RetryingSession, RunReport,
};

use crate::config::{Overrides, RunConfig};

/// Backing provider for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    /// In-memory provider loaded from an inventory YAML snapshot.
    Inventory,
    /// AWS SDK (requires the `aws` build feature).
    Aws,
}

/// Arguments for the `lcw run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run configuration file.
    #[arg(long, short)]
    pub config: PathBuf,

    /// Override the configured failure domain
    /// (target, deployment_scope, identity_scope, run).
    #[arg(long)]
    pub failure_domain: Option<FailureDomain>,

    /// Read targets from this list instead of the configured source.
    #[arg(long)]
    pub targets: Option<PathBuf>,

    /// Override the configured audit directory.
    #[arg(long)]
    pub audit_dir: Option<PathBuf>,

    /// Provider to enforce against.
    #[arg(long, value_enum, default_value_t = Provider::Inventory)]
    pub provider: Provider,

    /// Inventory snapshot for the inventory provider.
    #[arg(long)]
    pub inventory: Option<PathBuf>,

    /// Leave the inventory file untouched after the run.
    #[arg(long)]
    pub no_write_back: bool,
}

/// Execute the run subcommand.
pub fn run_enforce(args: &RunArgs) -> Result<u8> {
    let config = RunConfig::load(&args.config)?;
    let overrides = Overrides {
        failure_domain: args.failure_domain,
        targets: args.targets.clone(),
        audit_dir: args.audit_dir.clone(),
    };
    let resolved = config.resolve(&overrides)?;
    let targets = resolved.target_source()?;
    let kind = resolved.plan.kind();

    let runner = EnforcementRunner::new(resolved.task, resolved.plan, targets, resolved.failure_domain)?;

    let audit_path = resolved
        .audit_dir
        .join(audit_file_name(&resolved.name, Utc::now()));

    let report = match args.provider {
        Provider::Inventory => {
            let Some(path) = args.inventory.as_ref() else {
                bail!("--inventory is required with --provider inventory");
            };
            let inventory = Inventory::load(path)?;
            let session = InventorySession::new(inventory, kind);
            let mut audit = open_audit(&runner, &audit_path)?;
            let report = execute(&runner, session.clone(), resolved.retry, &mut audit)?;
            if !args.no_write_back {
                session
                    .snapshot()
                    .save(path)
                    .with_context(|| format!("cannot write inventory back to {}", path.display()))?;
                tracing::info!(inventory = %path.display(), "inventory written back");
            }
            report
        }
        Provider::Aws => aws_report(&runner, kind, resolved.retry, &audit_path)?,
    };

    print!("{report}");
    println!("audit log: {}", audit_path.display());
    Ok(if report.is_success() { 0 } else { 1 })
}

type AuditFile = JsonLinesAuditLog<std::io::BufWriter<std::fs::File>>;

/// Open the audit file. Callers open it only after the session is built.
fn open_audit(runner: &EnforcementRunner, path: &Path) -> Result<AuditFile> {
    let audit = JsonLinesAuditLog::create(path)
        .with_context(|| format!("cannot create audit file {}", path.display()))?;
    tracing::info!(run_id = %runner.run_id(), audit = %path.display(), "audit file opened");
    Ok(audit)
}

fn execute<S: CloudSession>(
    runner: &EnforcementRunner,
    session: S,
    retry: Option<RetryPolicy>,
    audit: &mut AuditFile,
) -> Result<RunReport> {
    let report = match retry {
        Some(policy) => runner.run(&RetryingSession::new(session, policy), audit)?,
        None => runner.run(&session, audit)?,
    };
    Ok(report)
}

#[cfg(feature = "aws")]
fn aws_report(
    runner: &EnforcementRunner,
    kind: lcw_core::ResourceKind,
    retry: Option<RetryPolicy>,
    audit_path: &Path,
) -> Result<RunReport> {
    let session = crate::aws::AwsSession::new(kind)?;
    let mut audit = open_audit(runner, audit_path)?;
    execute(runner, session, retry, &mut audit)
}

#[cfg(not(feature = "aws"))]
fn aws_report(
    _runner: &EnforcementRunner,
    _kind: lcw_core::ResourceKind,
    _retry: Option<RetryPolicy>,
    _audit_path: &Path,
) -> Result<RunReport> {
    bail!("this build of lcw has no AWS provider; rebuild with `--features aws`")
}
