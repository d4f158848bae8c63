//! # CLI Run
//!
//! Drives `lcw run` through its library entry point: YAML config, inventory
//! snapshot, audit file on disk and exit code.

use std::path::{Path, PathBuf};

use lcw_cli::run::{run_enforce, Provider, RunArgs};
use lcw_core::FailureDomain;
use lcw_engine::Inventory;

const CONFIG: &str = r#"
name: log-retention-14-to-30
kind: log_group
identities: [prod, staging]
regions: [us-east-1]
targets: { source: discover }
policy: { shape: retention, retention_days: 30 }
mode: { type: conditional, field: retention_days, equals: 14 }
failure_domain: deployment_scope
"#;

const ESTATE: &str = r#"
identities:
  prod:
    regions:
      us-east-1:
        log_groups:
          /app/api: { retention_in_days: 14 }
          /app/batch: { retention_in_days: 7 }
  staging:
    regions:
      us-east-1:
        log_groups:
          /app/api: { retention_in_days: 14 }
"#;

fn setup(dir: &Path) -> RunArgs {
    let config = dir.join("task.yaml");
    std::fs::write(&config, CONFIG).unwrap();
    let inventory = dir.join("inventory.yaml");
    std::fs::write(&inventory, ESTATE).unwrap();
    RunArgs {
        config,
        failure_domain: None,
        targets: None,
        audit_dir: Some(dir.join("audit")),
        provider: Provider::Inventory,
        inventory: Some(inventory),
        no_write_back: false,
    }
}

fn audit_lines(dir: &Path) -> Vec<serde_json::Value> {
    let files: Vec<PathBuf> = std::fs::read_dir(dir.join("audit"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    std::fs::read_to_string(&files[0])
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn discovery_run_migrates_matching_groups_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let args = setup(dir.path());

    assert_eq!(run_enforce(&args).unwrap(), 0);

    let inv = Inventory::load(args.inventory.as_ref().unwrap()).unwrap();
    for identity in ["prod", "staging"] {
        let api = inv.log_group(identity, "us-east-1", "/app/api").unwrap();
        assert_eq!(api.retention_in_days, Some(30));
    }
    let batch = inv.log_group("prod", "us-east-1", "/app/batch").unwrap();
    assert_eq!(batch.retention_in_days, Some(7));

    let records = audit_lines(dir.path());
    assert_eq!(records.len(), 3);
    let applied = records
        .iter()
        .filter(|r| r["outcome"]["outcome"] == "applied")
        .count();
    assert_eq!(applied, 2);
}

#[test]
fn static_override_with_missing_group_exits_one_under_target_domain() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = setup(dir.path());
    let list = dir.path().join("groups.csv");
    std::fs::write(&list, "/app/api\n/app/ghost\n").unwrap();
    args.targets = Some(list);
    args.failure_domain = Some(FailureDomain::Target);
    args.no_write_back = true;

    assert_eq!(run_enforce(&args).unwrap(), 1);

    let records = audit_lines(dir.path());
    let failed: Vec<&serde_json::Value> = records
        .iter()
        .filter(|r| r["outcome"]["outcome"] == "failed")
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|r| r["target"] == "/app/ghost"));
    assert!(failed
        .iter()
        .all(|r| r["outcome"]["detail"]["cause"] == "not_found"));

    let inv = Inventory::load(args.inventory.as_ref().unwrap()).unwrap();
    let api = inv.log_group("prod", "us-east-1", "/app/api").unwrap();
    assert_eq!(api.retention_in_days, Some(14));
}
