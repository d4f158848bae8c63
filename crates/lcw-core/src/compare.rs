//! # State Comparator
//!
//! Decides, per target, whether the desired policy should be written.
//!
//! - **Unconditional** mode always applies. Writing an identical
//!   configuration is a no-op at the provider, so re-asserting is safe.
//! - **Conditional** mode applies only when one observed field equals a
//!   trigger value exactly. It drives staged migrations such as "move every
//!   log group currently at 14 days to 30 days, leave everything else".
//!   A missing or unreadable field is a definite skip, never a match.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::kind::ResourceKind;
use crate::policy::DesiredPolicy;
use crate::state::{ObservedState, StateField};

/// The observed value a conditional run must see before it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Field to read from the observed state.
    pub field: StateField,
    /// Value the field must equal.
    pub equals: u32,
}

/// Update strategy of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Always write the desired policy.
    Unconditional,
    /// Write only when the trigger field equals the trigger value.
    Conditional {
        /// Field to read from the observed state.
        field: StateField,
        /// Value the field must equal.
        equals: u32,
    },
}

/// Why a target was left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The trigger field was absent or held a different value.
    TriggerMismatch {
        /// The trigger field.
        field: StateField,
        /// What the provider reported, if anything.
        observed: Option<u32>,
        /// What the trigger required.
        trigger: u32,
        /// What the policy would have set.
        desired: Option<u32>,
    },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TriggerMismatch {
                field,
                observed: Some(v),
                trigger,
                ..
            } => write!(f, "{field} is {v}, trigger is {trigger}"),
            Self::TriggerMismatch {
                field,
                observed: None,
                trigger,
                ..
            } => write!(f, "{field} is not set, trigger is {trigger}"),
        }
    }
}

/// Result of comparing observed and desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Write the desired policy.
    Apply,
    /// Leave the resource as it is.
    Skip(SkipReason),
}

impl ComparisonMode {
    /// The trigger of a conditional run.
    pub fn trigger(&self) -> Option<Trigger> {
        match *self {
            Self::Unconditional => None,
            Self::Conditional { field, equals } => Some(Trigger { field, equals }),
        }
    }

    /// Check that a conditional trigger names a field `kind` reports.
    pub fn validate_for(&self, kind: ResourceKind) -> Result<(), PolicyError> {
        match self.trigger() {
            Some(t) if !kind.trigger_fields().contains(&t.field) => {
                Err(PolicyError::UnsupportedTrigger {
                    field: t.field,
                    kind,
                })
            }
            _ => Ok(()),
        }
    }

    /// Decide whether `policy` should be written over `observed`.
    pub fn decide(&self, observed: &ObservedState, policy: &DesiredPolicy) -> Decision {
        let Some(trigger) = self.trigger() else {
            return Decision::Apply;
        };
        let current = observed.field(trigger.field);
        if current == Some(trigger.equals) {
            Decision::Apply
        } else {
            Decision::Skip(SkipReason::TriggerMismatch {
                field: trigger.field,
                observed: current,
                trigger: trigger.equals,
                desired: policy.field(trigger.field),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyParams;
    use crate::state::LifecycleRuleState;
    use proptest::prelude::*;

    fn retention_policy() -> DesiredPolicy {
        PolicyParams::Retention { retention_days: 30 }.build().unwrap()
    }

    fn conditional(equals: u32) -> ComparisonMode {
        ComparisonMode::Conditional {
            field: StateField::RetentionDays,
            equals,
        }
    }

    #[test]
    fn unconditional_always_applies() {
        let policy = retention_policy();
        for state in [
            ObservedState::Absent,
            ObservedState::Unknown,
            ObservedState::Retention {
                retention_days: Some(30),
            },
        ] {
            assert_eq!(
                ComparisonMode::Unconditional.decide(&state, &policy),
                Decision::Apply
            );
        }
    }

    #[test]
    fn conditional_applies_on_exact_match() {
        let state = ObservedState::Retention {
            retention_days: Some(14),
        };
        assert_eq!(conditional(14).decide(&state, &retention_policy()), Decision::Apply);
    }

    #[test]
    fn conditional_skips_other_values() {
        let state = ObservedState::Retention {
            retention_days: Some(30),
        };
        assert_eq!(
            conditional(14).decide(&state, &retention_policy()),
            Decision::Skip(SkipReason::TriggerMismatch {
                field: StateField::RetentionDays,
                observed: Some(30),
                trigger: 14,
                desired: Some(30),
            })
        );
    }

    #[test]
    fn conditional_skips_missing_field() {
        let state = ObservedState::Retention {
            retention_days: None,
        };
        assert!(matches!(
            conditional(14).decide(&state, &retention_policy()),
            Decision::Skip(SkipReason::TriggerMismatch { observed: None, .. })
        ));
    }

    #[test]
    fn conditional_skips_unknown_and_absent() {
        for state in [ObservedState::Unknown, ObservedState::Absent] {
            assert!(matches!(
                conditional(14).decide(&state, &retention_policy()),
                Decision::Skip(_)
            ));
        }
    }

    #[test]
    fn conditional_on_lifecycle_field() {
        let policy = PolicyParams::ExpireOnly {
            expire_after_days: 90,
            noncurrent_expire_after_days: None,
        }
        .build()
        .unwrap();
        let mode = ComparisonMode::Conditional {
            field: StateField::ExpireAfterDays,
            equals: 60,
        };
        let state = ObservedState::Lifecycle {
            rules: vec![LifecycleRuleState {
                enabled: true,
                expire_after_days: Some(60),
                ..Default::default()
            }],
        };
        assert_eq!(mode.decide(&state, &policy), Decision::Apply);
        let empty = ObservedState::Lifecycle { rules: vec![] };
        assert!(matches!(mode.decide(&empty, &policy), Decision::Skip(_)));
    }

    #[test]
    fn validate_for_rejects_foreign_trigger_field() {
        let err = conditional(14).validate_for(ResourceKind::Bucket).unwrap_err();
        assert!(matches!(err, PolicyError::UnsupportedTrigger { .. }));
        assert!(conditional(14).validate_for(ResourceKind::LogGroup).is_ok());
        assert!(ComparisonMode::Unconditional
            .validate_for(ResourceKind::Bucket)
            .is_ok());
    }

    #[test]
    fn skip_reason_display() {
        let reason = SkipReason::TriggerMismatch {
            field: StateField::RetentionDays,
            observed: None,
            trigger: 14,
            desired: Some(30),
        };
        assert_eq!(reason.to_string(), "retention_days is not set, trigger is 14");
    }

    #[test]
    fn mode_deserializes_from_tagged_map() {
        let mode: ComparisonMode = serde_json::from_value(serde_json::json!({
            "type": "conditional",
            "field": "retention_days",
            "equals": 14
        }))
        .unwrap();
        assert_eq!(mode, conditional(14));
    }

    proptest! {
        /// Conditional mode applies if and only if the observed value equals the trigger.
        #[test]
        fn conditional_applies_only_on_equality(
            observed in proptest::option::of(0u32..4000),
            trigger in 0u32..4000,
        ) {
            let state = ObservedState::Retention { retention_days: observed };
            let decision = conditional(trigger).decide(&state, &retention_policy());
            if observed == Some(trigger) {
                prop_assert_eq!(decision, Decision::Apply);
            } else {
                prop_assert!(matches!(decision, Decision::Skip(_)));
            }
        }
    }
}
