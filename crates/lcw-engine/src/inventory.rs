//! # Inventory Provider
//!
//! An in-memory [`CloudSession`] backed by a YAML inventory document. It
//! lets the CLI rehearse a run against a snapshot of an estate, and it is
//! the session the test suites drive the runner with.
//!
//! ```yaml
//! identities:
//!   prod:
//!     account_id: "111111111111"
//!     buckets:
//!       logs-bucket: {}
//!       archive-bucket:
//!         rules:
//!           - { id: old, enabled: true, expire_after_days: 30 }
//!     regions:
//!       us-east-1:
//!         log_groups:
//!           /app/api: { retention_in_days: 14 }
//!           /app/worker: {}
//! ```
//!
//! Entries can be marked `access_denied` or `reject_writes`, and listing can
//! be told to fail at a given page, to exercise failure paths.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use lcw_core::{
    DeploymentScope, DesiredPolicy, IdentityScope, LifecycleRuleState, ObservedState, ResourceId,
    ResourceKind,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::{CloudSession, Page, ResourceClient};
use crate::error::{ProviderError, SessionError};

/// Default number of names per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Error loading or saving an inventory document.
#[derive(Error, Debug)]
pub enum InventoryError {
    /// The file could not be read or written.
    #[error("inventory io error at {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not a valid inventory.
    #[error("invalid inventory document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A bucket and its lifecycle rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketEntry {
    /// Lifecycle rules; empty when no configuration is set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<LifecycleRuleState>,
    /// Every call for this bucket fails with `AccessDenied`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub access_denied: bool,
    /// Writes fail with `Rejected`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub reject_writes: bool,
}

/// A log group and its retention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroupEntry {
    /// Retention in days; `None` means entries never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_in_days: Option<u32>,
    /// Every call for this log group fails with `AccessDenied`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub access_denied: bool,
    /// Writes fail with `Rejected`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub reject_writes: bool,
}

/// Log groups of one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInventory {
    /// Log groups by name.
    #[serde(default)]
    pub log_groups: BTreeMap<String, LogGroupEntry>,
    /// Zero-based listing page that fails with a transient error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_listing_at_page: Option<usize>,
}

/// Everything visible to one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInventory {
    /// Account identifier reported by `describe_identity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Buckets by name. Buckets are global to the identity.
    #[serde(default)]
    pub buckets: BTreeMap<String, BucketEntry>,
    /// Zero-based bucket listing page that fails with a transient error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_listing_at_page: Option<usize>,
    /// Regions by name.
    #[serde(default)]
    pub regions: BTreeMap<String, RegionInventory>,
}

/// A snapshot of an estate across identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Identities by name.
    #[serde(default)]
    pub identities: BTreeMap<String, IdentityInventory>,
}

impl Inventory {
    /// Parse an inventory from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, InventoryError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load an inventory file.
    pub fn load(path: &Path) -> Result<Self, InventoryError> {
        let text = std::fs::read_to_string(path).map_err(|source| InventoryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Write the inventory back as YAML.
    pub fn save(&self, path: &Path) -> Result<(), InventoryError> {
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text).map_err(|source| InventoryError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Current state of a bucket, for assertions and reports.
    pub fn bucket(&self, identity: &str, bucket: &str) -> Option<&BucketEntry> {
        self.identities.get(identity)?.buckets.get(bucket)
    }

    /// Current state of a log group, for assertions and reports.
    pub fn log_group(&self, identity: &str, region: &str, group: &str) -> Option<&LogGroupEntry> {
        self.identities
            .get(identity)?
            .regions
            .get(region)?
            .log_groups
            .get(group)
    }
}

// ---------------------------------------------------------------------------
// InventorySession
// ---------------------------------------------------------------------------

/// [`CloudSession`] over a shared [`Inventory`].
#[derive(Debug, Clone)]
pub struct InventorySession {
    inventory: Arc<Mutex<Inventory>>,
    kind: ResourceKind,
    page_size: usize,
}

impl InventorySession {
    /// Serve resources of `kind` from `inventory`.
    pub fn new(inventory: Inventory, kind: ResourceKind) -> Self {
        Self {
            inventory: Arc::new(Mutex::new(inventory)),
            kind,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a different listing page size. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Copy of the inventory as it stands now, writes included.
    pub fn snapshot(&self) -> Inventory {
        self.inventory.lock().clone()
    }
}

impl CloudSession for InventorySession {
    fn open(
        &self,
        identity: &IdentityScope,
        deployment: Option<&DeploymentScope>,
    ) -> Result<Box<dyn ResourceClient>, SessionError> {
        let inv = self.inventory.lock();
        let Some(entry) = inv.identities.get(identity.as_str()) else {
            return Err(SessionError::UnknownIdentity {
                identity: identity.to_string(),
            });
        };
        let region = match (self.kind.is_regional(), deployment) {
            (true, Some(d)) => {
                if !entry.regions.contains_key(d.as_str()) {
                    return Err(SessionError::UnknownDeployment {
                        identity: identity.to_string(),
                        deployment: d.to_string(),
                    });
                }
                Some(d.as_str().to_string())
            }
            (false, None) => None,
            (true, None) => {
                return Err(SessionError::ScopeShape(format!(
                    "{} requires a deployment scope",
                    self.kind
                )))
            }
            (false, Some(d)) => {
                return Err(SessionError::ScopeShape(format!(
                    "{} is global but deployment scope '{d}' was given",
                    self.kind
                )))
            }
        };
        Ok(Box::new(InventoryClient {
            inventory: Arc::clone(&self.inventory),
            identity: identity.as_str().to_string(),
            region,
            kind: self.kind,
            page_size: self.page_size,
        }))
    }

    fn describe_identity(&self, identity: &IdentityScope) -> Option<String> {
        self.inventory
            .lock()
            .identities
            .get(identity.as_str())
            .and_then(|i| i.account_id.clone())
    }
}

/// Client for one identity (and region) of an inventory.
struct InventoryClient {
    inventory: Arc<Mutex<Inventory>>,
    identity: String,
    region: Option<String>,
    kind: ResourceKind,
    page_size: usize,
}

/// Flags and state of one entry, independent of kind.
enum Entry {
    Missing,
    Denied,
    Present {
        state: ObservedState,
        reject_writes: bool,
    },
}

impl InventoryClient {
    fn with_identity<T>(&self, f: impl FnOnce(&mut IdentityInventory) -> T) -> Option<T> {
        let mut inv = self.inventory.lock();
        inv.identities.get_mut(&self.identity).map(f)
    }

    fn lookup(&self, id: &ResourceId) -> Entry {
        let region = self.region.clone();
        let kind = self.kind;
        self.with_identity(|ident| match kind {
            ResourceKind::Bucket => match ident.buckets.get(id.as_str()) {
                None => Entry::Missing,
                Some(b) if b.access_denied => Entry::Denied,
                Some(b) => Entry::Present {
                    state: ObservedState::Lifecycle {
                        rules: b.rules.clone(),
                    },
                    reject_writes: b.reject_writes,
                },
            },
            ResourceKind::LogGroup => {
                let group = region
                    .as_deref()
                    .and_then(|r| ident.regions.get(r))
                    .and_then(|r| r.log_groups.get(id.as_str()));
                match group {
                    None => Entry::Missing,
                    Some(g) if g.access_denied => Entry::Denied,
                    Some(g) => Entry::Present {
                        state: ObservedState::Retention {
                            retention_days: g.retention_in_days,
                        },
                        reject_writes: g.reject_writes,
                    },
                }
            }
        })
        .unwrap_or(Entry::Missing)
    }

    fn denied(id: &ResourceId) -> ProviderError {
        ProviderError::AccessDenied {
            resource: id.to_string(),
            message: "access denied by inventory".into(),
        }
    }

    fn names(&self) -> (Vec<String>, Option<usize>) {
        let region = self.region.clone();
        let kind = self.kind;
        self.with_identity(|ident| match kind {
            ResourceKind::Bucket => (
                ident.buckets.keys().cloned().collect(),
                ident.fail_listing_at_page,
            ),
            ResourceKind::LogGroup => region
                .as_deref()
                .and_then(|r| ident.regions.get(r))
                .map(|r| (r.log_groups.keys().cloned().collect(), r.fail_listing_at_page))
                .unwrap_or_default(),
        })
        .unwrap_or_default()
    }
}

impl ResourceClient for InventoryClient {
    fn exists(&self, id: &ResourceId) -> Result<bool, ProviderError> {
        match self.lookup(id) {
            Entry::Missing => Ok(false),
            Entry::Denied => Err(Self::denied(id)),
            Entry::Present { .. } => Ok(true),
        }
    }

    fn current_state(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        match self.lookup(id) {
            Entry::Missing => Ok(ObservedState::Absent),
            Entry::Denied => Err(Self::denied(id)),
            Entry::Present { state, .. } => Ok(state),
        }
    }

    fn put_desired_state(&self, id: &ResourceId, policy: &DesiredPolicy) -> Result<(), ProviderError> {
        if policy.kind() != self.kind {
            return Err(ProviderError::Unsupported {
                operation: format!("writing a {} policy to a {}", policy.shape_name(), self.kind),
            });
        }
        match self.lookup(id) {
            Entry::Missing => {
                return Err(ProviderError::NotFound {
                    resource: id.to_string(),
                })
            }
            Entry::Denied => return Err(Self::denied(id)),
            Entry::Present {
                reject_writes: true,
                ..
            } => {
                return Err(ProviderError::Rejected {
                    resource: id.to_string(),
                    message: "write rejected by inventory".into(),
                })
            }
            Entry::Present { .. } => {}
        }

        let region = self.region.clone();
        self.with_identity(|ident| match policy {
            DesiredPolicy::Lifecycle(p) => {
                if let Some(b) = ident.buckets.get_mut(id.as_str()) {
                    b.rules = vec![p.to_rule_state(id)];
                }
            }
            DesiredPolicy::Retention(p) => {
                if let Some(g) = region
                    .as_deref()
                    .and_then(|r| ident.regions.get_mut(r))
                    .and_then(|r| r.log_groups.get_mut(id.as_str()))
                {
                    g.retention_in_days = Some(p.retention_days);
                }
            }
        });
        Ok(())
    }

    fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError> {
        let offset = match token {
            None => 0,
            Some(t) => t
                .strip_prefix("offset:")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ProviderError::Rejected {
                    resource: "listing".into(),
                    message: format!("invalid pagination token '{t}'"),
                })?,
        };
        let (names, fail_at) = self.names();
        if fail_at == Some(offset / self.page_size) {
            return Err(ProviderError::Transient {
                message: format!("listing failed at page {}", offset / self.page_size),
            });
        }
        let end = (offset + self.page_size).min(names.len());
        let items = names
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|n| ResourceId::new(n.as_str()))
            .collect();
        let next_token = (end < names.len()).then(|| format!("offset:{end}"));
        Ok(Page { items, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::{DiscoveryTargets, TargetSource};
    use lcw_core::PolicyParams;

    const YAML: &str = r#"
identities:
  prod:
    account_id: "111111111111"
    buckets:
      bucket-a: {}
      bucket-b:
        rules:
          - { id: old, enabled: true, expire_after_days: 30 }
      locked: { access_denied: true }
    regions:
      us-east-1:
        log_groups:
          g1: { retention_in_days: 14 }
          g2: { retention_in_days: 30 }
          g3: {}
"#;

    fn inventory() -> Inventory {
        Inventory::from_yaml_str(YAML).unwrap()
    }

    #[test]
    fn parses_inventory_document() {
        let inv = inventory();
        assert_eq!(inv.identities["prod"].buckets.len(), 3);
        assert_eq!(
            inv.log_group("prod", "us-east-1", "g1").unwrap().retention_in_days,
            Some(14)
        );
    }

    #[test]
    fn open_rejects_unknown_scopes() {
        let session = InventorySession::new(inventory(), ResourceKind::LogGroup);
        assert!(matches!(
            session.open(&IdentityScope::new("staging"), Some(&DeploymentScope::new("us-east-1"))),
            Err(SessionError::UnknownIdentity { .. })
        ));
        assert!(matches!(
            session.open(&IdentityScope::new("prod"), Some(&DeploymentScope::new("eu-west-1"))),
            Err(SessionError::UnknownDeployment { .. })
        ));
        assert!(matches!(
            session.open(&IdentityScope::new("prod"), None),
            Err(SessionError::ScopeShape(_))
        ));
    }

    #[test]
    fn bucket_reads_and_writes() {
        let session = InventorySession::new(inventory(), ResourceKind::Bucket);
        let client = session.open(&IdentityScope::new("prod"), None).unwrap();
        let a = ResourceId::new("bucket-a");
        assert!(client.exists(&a).unwrap());
        assert!(!client.exists(&ResourceId::new("nope")).unwrap());
        assert!(matches!(
            client.exists(&ResourceId::new("locked")),
            Err(ProviderError::AccessDenied { .. })
        ));

        let policy = PolicyParams::ExpireOnly {
            expire_after_days: 60,
            noncurrent_expire_after_days: None,
        }
        .build()
        .unwrap();
        client.put_desired_state(&a, &policy).unwrap();

        let snap = session.snapshot();
        let rules = &snap.bucket("prod", "bucket-a").unwrap().rules;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id.as_deref(), Some("bucket-a_lifecycle_policy_expire"));
        assert_eq!(rules[0].expire_after_days, Some(60));
    }

    #[test]
    fn rejected_write_leaves_state_untouched() {
        let mut inv = inventory();
        inv.identities
            .get_mut("prod")
            .unwrap()
            .regions
            .get_mut("us-east-1")
            .unwrap()
            .log_groups
            .get_mut("g1")
            .unwrap()
            .reject_writes = true;
        let session = InventorySession::new(inv, ResourceKind::LogGroup);
        let client = session
            .open(&IdentityScope::new("prod"), Some(&DeploymentScope::new("us-east-1")))
            .unwrap();
        let policy = PolicyParams::Retention { retention_days: 30 }.build().unwrap();
        assert!(matches!(
            client.put_desired_state(&ResourceId::new("g1"), &policy),
            Err(ProviderError::Rejected { .. })
        ));
        assert_eq!(
            session.snapshot().log_group("prod", "us-east-1", "g1").unwrap().retention_in_days,
            Some(14)
        );
    }

    #[test]
    fn listing_pages_through_every_name() {
        let session = InventorySession::new(inventory(), ResourceKind::LogGroup).with_page_size(2);
        let client = session
            .open(&IdentityScope::new("prod"), Some(&DeploymentScope::new("us-east-1")))
            .unwrap();
        let first = client.list_page(None).unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("offset:2"));

        let names: Vec<String> = DiscoveryTargets
            .resolve(client.as_ref())
            .map(|r| r.unwrap().as_str().to_string())
            .collect();
        assert_eq!(names, vec!["g1", "g2", "g3"]);
    }

    #[test]
    fn listing_failure_at_configured_page() {
        let mut inv = inventory();
        inv.identities.get_mut("prod").unwrap().fail_listing_at_page = Some(1);
        let session = InventorySession::new(inv, ResourceKind::Bucket).with_page_size(2);
        let client = session.open(&IdentityScope::new("prod"), None).unwrap();
        assert!(client.list_page(None).is_ok());
        assert!(matches!(
            client.list_page(Some("offset:2")),
            Err(ProviderError::Transient { .. })
        ));
        assert!(matches!(
            client.list_page(Some("garbage")),
            Err(ProviderError::Rejected { .. })
        ));
    }

    #[test]
    fn describe_identity_reports_account() {
        let session = InventorySession::new(inventory(), ResourceKind::Bucket);
        assert_eq!(
            session.describe_identity(&IdentityScope::new("prod")).as_deref(),
            Some("111111111111")
        );
        assert_eq!(session.describe_identity(&IdentityScope::new("other")), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.yaml");
        let inv = inventory();
        inv.save(&path).unwrap();
        assert_eq!(Inventory::load(&path).unwrap(), inv);
    }
}
