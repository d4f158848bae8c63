//! # Desired Policies
//!
//! Run parameters (`PolicyParams`) are validated once and turned into an
//! immutable `DesiredPolicy` before any scope is processed. The policy is
//! fully determined by run parameters; the only per-target input is the
//! resource name, which lifecycle rule identifiers are derived from.
//!
//! ## Shapes
//!
//! - **Expire-only**: objects older than `expire_after_days` are deleted.
//! - **Transition-then-expire**: objects move to a cooler storage class after
//!   `transition_after_days` and expire later. Noncurrent versions follow
//!   their own pair of day counts, defaulting to the current-version values
//!   only when the caller leaves them out.
//! - **Transition-plus-year**: a preset of the previous shape where
//!   expiration is `transition + 365` for both version kinds.
//! - **Retention**: log entries older than `retention_days` are deleted.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::PolicyError;
use crate::kind::ResourceKind;
use crate::scope::ResourceId;
use crate::state::{LifecycleRuleState, StateField};

/// Retention periods the log provider accepts.
pub const ALLOWED_RETENTION_DAYS: [u32; 22] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Transition day counts offered by the transition-plus-year preset.
pub const PRESET_TRANSITION_DAYS: [u32; 5] = [30, 60, 90, 180, 360];

/// Days between transition and expiration in the transition-plus-year preset.
pub const PRESET_EXPIRATION_OFFSET_DAYS: u32 = 365;

const EXPIRE_RULE_SUFFIX: &str = "lifecycle_policy_expire";
const TRANSITION_RULE_SUFFIX: &str = "lifecycle_policy";

// ---------------------------------------------------------------------------
// StorageClass
// ---------------------------------------------------------------------------

/// Storage tier objects transition into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageClass {
    /// Archive tier with hours-long retrieval.
    Glacier,
    /// Archive tier with millisecond retrieval.
    GlacierIr,
    /// Lowest-cost archive tier.
    DeepArchive,
    /// Infrequent-access tier.
    StandardIa,
}

impl StorageClass {
    /// Provider name of this storage class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Glacier => "GLACIER",
            Self::GlacierIr => "GLACIER_IR",
            Self::DeepArchive => "DEEP_ARCHIVE",
            Self::StandardIa => "STANDARD_IA",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StorageClass {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GLACIER" => Ok(Self::Glacier),
            "GLACIER_IR" => Ok(Self::GlacierIr),
            "DEEP_ARCHIVE" => Ok(Self::DeepArchive),
            "STANDARD_IA" => Ok(Self::StandardIa),
            other => Err(PolicyError::UnknownStorageClass(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Built policies
// ---------------------------------------------------------------------------

/// A move to a cooler storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStep {
    /// Days before the transition.
    pub after_days: u32,
    /// Destination storage class.
    pub storage_class: StorageClass,
}

/// Transition and expiration schedule for one version kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSchedule {
    /// Optional transition, always before expiration.
    pub transition: Option<TransitionStep>,
    /// Days before deletion.
    pub expire_after_days: u32,
}

impl VersionSchedule {
    fn validate(&self, versions: &'static str) -> Result<(), PolicyError> {
        if let Some(step) = self.transition {
            if step.after_days >= self.expire_after_days {
                return Err(PolicyError::TransitionNotBeforeExpiration {
                    versions,
                    transition_days: step.after_days,
                    expiration_days: self.expire_after_days,
                });
            }
        }
        Ok(())
    }
}

/// Desired lifecycle configuration of a bucket: a single enabled rule that
/// applies to every object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    rule_suffix: String,
    /// Schedule for current object versions.
    pub current: VersionSchedule,
    /// Schedule for noncurrent object versions.
    pub noncurrent: VersionSchedule,
}

impl LifecyclePolicy {
    /// Rule identifier for a given bucket, e.g. `logs-bucket_lifecycle_policy`.
    pub fn rule_id(&self, bucket: &ResourceId) -> String {
        format!("{}_{}", bucket.as_str(), self.rule_suffix)
    }

    /// The rule this policy installs, as the provider would report it back.
    pub fn to_rule_state(&self, bucket: &ResourceId) -> LifecycleRuleState {
        LifecycleRuleState {
            id: Some(self.rule_id(bucket)),
            enabled: true,
            transition_after_days: self.current.transition.map(|t| t.after_days),
            storage_class: self
                .current
                .transition
                .map(|t| t.storage_class.as_str().to_string()),
            expire_after_days: Some(self.current.expire_after_days),
            noncurrent_transition_after_days: self.noncurrent.transition.map(|t| t.after_days),
            noncurrent_expire_after_days: Some(self.noncurrent.expire_after_days),
        }
    }

    fn render(&self, bucket: &ResourceId) -> Value {
        let mut rule = serde_json::Map::new();
        rule.insert("ID".into(), json!(self.rule_id(bucket)));
        rule.insert("Filter".into(), json!({}));
        rule.insert("Status".into(), json!("Enabled"));
        if let Some(step) = self.current.transition {
            rule.insert(
                "Transitions".into(),
                json!([{ "Days": step.after_days, "StorageClass": step.storage_class.as_str() }]),
            );
        }
        rule.insert(
            "Expiration".into(),
            json!({ "Days": self.current.expire_after_days }),
        );
        if let Some(step) = self.noncurrent.transition {
            rule.insert(
                "NoncurrentVersionTransitions".into(),
                json!([{ "NoncurrentDays": step.after_days, "StorageClass": step.storage_class.as_str() }]),
            );
        }
        rule.insert(
            "NoncurrentVersionExpiration".into(),
            json!({ "NoncurrentDays": self.noncurrent.expire_after_days }),
        );
        json!({ "Rules": [Value::Object(rule)] })
    }
}

/// Desired retention of a log group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Days log entries are kept.
    pub retention_days: u32,
}

/// Target configuration a run converges resources toward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DesiredPolicy {
    /// Bucket lifecycle rule.
    Lifecycle(LifecyclePolicy),
    /// Log group retention.
    Retention(RetentionPolicy),
}

impl DesiredPolicy {
    /// The resource kind this policy applies to.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Lifecycle(_) => ResourceKind::Bucket,
            Self::Retention(_) => ResourceKind::LogGroup,
        }
    }

    /// Shape name used in logs and error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Lifecycle(_) => "lifecycle",
            Self::Retention(_) => "retention",
        }
    }

    /// The value this policy sets for an observable field, if it sets one.
    pub fn field(&self, field: StateField) -> Option<u32> {
        match (self, field) {
            (Self::Retention(p), StateField::RetentionDays) => Some(p.retention_days),
            (Self::Lifecycle(p), StateField::ExpireAfterDays) => Some(p.current.expire_after_days),
            (Self::Lifecycle(p), StateField::TransitionAfterDays) => {
                p.current.transition.map(|t| t.after_days)
            }
            _ => None,
        }
    }

    /// Render the provider-facing configuration document for one target.
    pub fn render(&self, target: &ResourceId) -> Value {
        match self {
            Self::Lifecycle(p) => p.render(target),
            Self::Retention(p) => json!({
                "logGroupName": target.as_str(),
                "retentionInDays": p.retention_days,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyParams
// ---------------------------------------------------------------------------

/// Validated-on-build run parameters for each policy shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PolicyParams {
    /// Delete objects after a fixed age.
    ExpireOnly {
        /// Days before current versions expire.
        expire_after_days: u32,
        /// Days before noncurrent versions expire. Defaults to `expire_after_days`.
        #[serde(default)]
        noncurrent_expire_after_days: Option<u32>,
    },
    /// Move objects to a cooler tier, then delete them.
    TransitionThenExpire {
        /// Days before current versions transition.
        transition_after_days: u32,
        /// Days before current versions expire.
        expire_after_days: u32,
        /// Destination storage class for both version kinds.
        storage_class: StorageClass,
        /// Days before noncurrent versions transition. Defaults to `transition_after_days`.
        #[serde(default)]
        noncurrent_transition_after_days: Option<u32>,
        /// Days before noncurrent versions expire. Defaults to `expire_after_days`.
        #[serde(default)]
        noncurrent_expire_after_days: Option<u32>,
    },
    /// Transition after one of the preset day counts, expire a year later.
    TransitionPlusYear {
        /// One of [`PRESET_TRANSITION_DAYS`].
        transition_after_days: u32,
        /// Destination storage class.
        storage_class: StorageClass,
    },
    /// Keep log entries for a fixed period.
    Retention {
        /// One of [`ALLOWED_RETENTION_DAYS`].
        retention_days: u32,
    },
}

impl PolicyParams {
    /// Validate the parameters and build the desired policy.
    ///
    /// Fails with a [`PolicyError`] for any self-contradictory or
    /// provider-unacceptable parameter set, so that invalid input is never
    /// discovered mid-run.
    pub fn build(&self) -> Result<DesiredPolicy, PolicyError> {
        match *self {
            Self::ExpireOnly {
                expire_after_days,
                noncurrent_expire_after_days,
            } => {
                non_zero("expire_after_days", expire_after_days)?;
                let noncurrent = noncurrent_expire_after_days.unwrap_or(expire_after_days);
                non_zero("noncurrent_expire_after_days", noncurrent)?;
                Ok(DesiredPolicy::Lifecycle(LifecyclePolicy {
                    rule_suffix: EXPIRE_RULE_SUFFIX.to_string(),
                    current: VersionSchedule {
                        transition: None,
                        expire_after_days,
                    },
                    noncurrent: VersionSchedule {
                        transition: None,
                        expire_after_days: noncurrent,
                    },
                }))
            }
            Self::TransitionThenExpire {
                transition_after_days,
                expire_after_days,
                storage_class,
                noncurrent_transition_after_days,
                noncurrent_expire_after_days,
            } => transition_policy(
                storage_class,
                (transition_after_days, expire_after_days),
                (
                    noncurrent_transition_after_days.unwrap_or(transition_after_days),
                    noncurrent_expire_after_days.unwrap_or(expire_after_days),
                ),
            ),
            Self::TransitionPlusYear {
                transition_after_days,
                storage_class,
            } => {
                if !PRESET_TRANSITION_DAYS.contains(&transition_after_days) {
                    return Err(PolicyError::UnsupportedPresetDays(transition_after_days));
                }
                let expire = transition_after_days + PRESET_EXPIRATION_OFFSET_DAYS;
                transition_policy(
                    storage_class,
                    (transition_after_days, expire),
                    (transition_after_days, expire),
                )
            }
            Self::Retention { retention_days } => {
                if !ALLOWED_RETENTION_DAYS.contains(&retention_days) {
                    return Err(PolicyError::UnsupportedRetention(retention_days));
                }
                Ok(DesiredPolicy::Retention(RetentionPolicy { retention_days }))
            }
        }
    }

    /// Build the policy and check that it applies to `kind`.
    pub fn build_for(&self, kind: ResourceKind) -> Result<DesiredPolicy, PolicyError> {
        let policy = self.build()?;
        if policy.kind() != kind {
            return Err(PolicyError::KindMismatch {
                policy: policy.shape_name(),
                kind,
            });
        }
        Ok(policy)
    }
}

fn non_zero(field: &'static str, days: u32) -> Result<(), PolicyError> {
    if days == 0 {
        Err(PolicyError::ZeroDays { field })
    } else {
        Ok(())
    }
}

fn transition_policy(
    storage_class: StorageClass,
    (transition, expire): (u32, u32),
    (noncurrent_transition, noncurrent_expire): (u32, u32),
) -> Result<DesiredPolicy, PolicyError> {
    non_zero("transition_after_days", transition)?;
    non_zero("noncurrent_transition_after_days", noncurrent_transition)?;

    let current = VersionSchedule {
        transition: Some(TransitionStep {
            after_days: transition,
            storage_class,
        }),
        expire_after_days: expire,
    };
    let noncurrent = VersionSchedule {
        transition: Some(TransitionStep {
            after_days: noncurrent_transition,
            storage_class,
        }),
        expire_after_days: noncurrent_expire,
    };
    current.validate("current")?;
    noncurrent.validate("noncurrent")?;

    Ok(DesiredPolicy::Lifecycle(LifecyclePolicy {
        rule_suffix: TRANSITION_RULE_SUFFIX.to_string(),
        current,
        noncurrent,
    }))
}
