//! # Validate Subcommand
//!
//! Loads and validates a run configuration without contacting any provider,
//! then prints the resolved plan and the desired-state document as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use lcw_core::{FailureDomain, ResourceId};

use crate::config::{Overrides, RunConfig};

/// Arguments for the `lcw validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Run configuration file.
    #[arg(long, short)]
    pub config: PathBuf,

    /// Override the configured failure domain.
    #[arg(long)]
    pub failure_domain: Option<FailureDomain>,

    /// Check this target list instead of the configured source.
    #[arg(long)]
    pub targets: Option<PathBuf>,
}

/// Execute the validate subcommand.
///
/// Returns 0 when the configuration is usable. Problems are returned as
/// errors and map to exit code 2.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let plan = describe(args)?;
    let text = serde_json::to_string_pretty(&plan).context("cannot render plan")?;
    println!("{text}");
    Ok(0)
}

/// Build the JSON description of a validated run.
pub fn describe(args: &ValidateArgs) -> Result<serde_json::Value> {
    let config = RunConfig::load(&args.config)?;
    let resolved = config.resolve(&Overrides {
        failure_domain: args.failure_domain,
        targets: args.targets.clone(),
        audit_dir: None,
    })?;
    let source = resolved.target_source()?;

    // Rule IDs embed the target name, so render against a placeholder.
    let sample = ResourceId::new("<target>");
    let scopes: Vec<String> = resolved.plan.scopes().iter().map(|s| s.to_string()).collect();

    tracing::debug!(name = %resolved.name, scopes = scopes.len(), "configuration validated");

    Ok(json!({
        "name": resolved.name,
        "kind": resolved.plan.kind(),
        "failure_domain": resolved.failure_domain,
        "failure_domain_effect": resolved.failure_domain.describe(),
        "scopes": scopes,
        "targets": source.describe(),
        "mode": resolved.task.mode(),
        "policy": resolved.task.policy(),
        "document": resolved.task.policy().render(&sample),
        "audit_dir": resolved.audit_dir,
        "retry": resolved.retry,
    }))
}
