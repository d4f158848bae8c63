//! Property tests for conditional runs over generated estates.

use std::collections::BTreeMap;

use lcw_core::{
    ComparisonMode, DeploymentScope, EnforcementOutcome, FailureDomain, IdentityScope,
    PolicyParams, ResourceKind, StateField,
};
use lcw_engine::inventory::{IdentityInventory, LogGroupEntry, RegionInventory};
use lcw_engine::{
    DiscoveryTargets, EnforcementRunner, EnforcementTask, Inventory, InventorySession,
    MemoryAuditLog, ScopePlan,
};
use proptest::prelude::*;

fn estate(groups: &[Option<u32>]) -> Inventory {
    let log_groups: BTreeMap<String, LogGroupEntry> = groups
        .iter()
        .enumerate()
        .map(|(i, retention)| {
            (
                format!("group-{i:03}"),
                LogGroupEntry {
                    retention_in_days: *retention,
                    ..LogGroupEntry::default()
                },
            )
        })
        .collect();
    let mut regions = BTreeMap::new();
    regions.insert(
        "us-east-1".to_string(),
        RegionInventory {
            log_groups,
            fail_listing_at_page: None,
        },
    );
    let mut identities = BTreeMap::new();
    identities.insert(
        "prod".to_string(),
        IdentityInventory {
            regions,
            ..IdentityInventory::default()
        },
    );
    Inventory { identities }
}

proptest! {
    /// Exactly the groups at the trigger value are written; every other
    /// group keeps its retention.
    #[test]
    fn conditional_run_touches_only_matching_groups(
        groups in proptest::collection::vec(
            proptest::option::of(prop_oneof![Just(7u32), Just(14u32), Just(30u32)]),
            0..40,
        ),
        page_size in 1usize..8,
    ) {
        let session = InventorySession::new(estate(&groups), ResourceKind::LogGroup)
            .with_page_size(page_size);
        let task = EnforcementTask::from_params(
            &PolicyParams::Retention { retention_days: 30 },
            ResourceKind::LogGroup,
            ComparisonMode::Conditional { field: StateField::RetentionDays, equals: 14 },
        )
        .unwrap();
        let plan = ScopePlan::new(
            ResourceKind::LogGroup,
            vec![IdentityScope::new("prod")],
            vec![DeploymentScope::new("us-east-1")],
        )
        .unwrap();
        let runner = EnforcementRunner::new(
            task,
            plan,
            Box::new(DiscoveryTargets),
            FailureDomain::Run,
        )
        .unwrap();
        let mut audit = MemoryAuditLog::new();
        let report = runner.run(&session, &mut audit).unwrap();

        prop_assert!(report.is_success());
        prop_assert_eq!(audit.len(), groups.len());

        let snap = session.snapshot();
        for (i, before) in groups.iter().enumerate() {
            let name = format!("group-{i:03}");
            let after = snap.log_group("prod", "us-east-1", &name).unwrap().retention_in_days;
            let outcome = &audit.for_target(&name)[0].outcome;
            if *before == Some(14) {
                prop_assert_eq!(after, Some(30));
                prop_assert_eq!(outcome, &EnforcementOutcome::Applied);
            } else {
                prop_assert_eq!(after, *before);
                prop_assert!(matches!(outcome, EnforcementOutcome::Skipped(_)));
            }
        }
    }
}
