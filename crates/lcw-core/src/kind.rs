//! # Resource Kinds
//!
//! The kinds of resource the engine knows how to converge. A kind decides
//! whether work is split per region and which observed fields a conditional
//! run may trigger on.

use serde::{Deserialize, Serialize};

use crate::state::StateField;

/// A kind of cloud resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Object storage bucket. Globally namespaced; no deployment scope.
    Bucket,
    /// Log group. Regional; one unit of work per region.
    LogGroup,
}

impl ResourceKind {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::LogGroup => "log_group",
        }
    }

    /// Whether this kind requires a deployment scope per unit of work.
    pub fn is_regional(&self) -> bool {
        matches!(self, Self::LogGroup)
    }

    /// Observed fields a conditional run may compare against for this kind.
    pub fn trigger_fields(&self) -> &'static [StateField] {
        match self {
            Self::Bucket => &[StateField::ExpireAfterDays, StateField::TransitionAfterDays],
            Self::LogGroup => &[StateField::RetentionDays],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bucket" => Ok(Self::Bucket),
            "log_group" => Ok(Self::LogGroup),
            other => Err(format!("unknown resource kind '{other}' (expected bucket or log_group)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_log_groups_are_regional() {
        assert!(ResourceKind::LogGroup.is_regional());
        assert!(!ResourceKind::Bucket.is_regional());
    }

    #[test]
    fn from_str_matches_as_str() {
        for kind in [ResourceKind::Bucket, ResourceKind::LogGroup] {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("queue".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn trigger_fields_per_kind() {
        assert_eq!(ResourceKind::LogGroup.trigger_fields(), &[StateField::RetentionDays]);
        assert!(!ResourceKind::Bucket
            .trigger_fields()
            .contains(&StateField::RetentionDays));
    }
}
