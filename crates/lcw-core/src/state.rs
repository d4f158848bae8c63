//! # Observed State
//!
//! The current configuration of one resource as read from its provider at
//! decision time. Read fresh for every target and never cached across targets.

use serde::{Deserialize, Serialize};

/// A single observed field a conditional run can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    /// Log retention period in days.
    RetentionDays,
    /// Current-version expiration of the first enabled lifecycle rule.
    ExpireAfterDays,
    /// Current-version transition of the first enabled lifecycle rule.
    TransitionAfterDays,
}

impl StateField {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetentionDays => "retention_days",
            Self::ExpireAfterDays => "expire_after_days",
            Self::TransitionAfterDays => "transition_after_days",
        }
    }
}

impl std::fmt::Display for StateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle rule as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LifecycleRuleState {
    /// Rule identifier, if the provider reports one.
    #[serde(default)]
    pub id: Option<String>,
    /// Whether the rule is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Days after creation before current versions transition.
    #[serde(default)]
    pub transition_after_days: Option<u32>,
    /// Storage class current versions transition to.
    #[serde(default)]
    pub storage_class: Option<String>,
    /// Days after creation before current versions expire.
    #[serde(default)]
    pub expire_after_days: Option<u32>,
    /// Days after becoming noncurrent before versions transition.
    #[serde(default)]
    pub noncurrent_transition_after_days: Option<u32>,
    /// Days after becoming noncurrent before versions expire.
    #[serde(default)]
    pub noncurrent_expire_after_days: Option<u32>,
}

/// The configuration of one resource at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ObservedState {
    /// The resource does not exist.
    Absent,
    /// The provider answered but the configuration could not be interpreted.
    Unknown,
    /// A log group's retention setting. `None` means "never expire".
    Retention {
        /// Current retention in days.
        retention_days: Option<u32>,
    },
    /// A bucket's lifecycle rules. Empty when no configuration is set.
    Lifecycle {
        /// Rules in provider order.
        rules: Vec<LifecycleRuleState>,
    },
}

impl ObservedState {
    /// Read a single observed field.
    ///
    /// Returns `None` whenever the field is not present in this state: the
    /// resource is absent or unknown, the field belongs to a different
    /// resource kind, or the configuration simply does not set it. Lifecycle
    /// fields come from the first enabled rule.
    pub fn field(&self, field: StateField) -> Option<u32> {
        match (self, field) {
            (Self::Retention { retention_days }, StateField::RetentionDays) => *retention_days,
            (Self::Lifecycle { rules }, StateField::ExpireAfterDays) => {
                first_enabled(rules).and_then(|r| r.expire_after_days)
            }
            (Self::Lifecycle { rules }, StateField::TransitionAfterDays) => {
                first_enabled(rules).and_then(|r| r.transition_after_days)
            }
            _ => None,
        }
    }

    /// Whether the provider reported the resource as absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

fn first_enabled(rules: &[LifecycleRuleState]) -> Option<&LifecycleRuleState> {
    rules.iter().find(|r| r.enabled)
}
