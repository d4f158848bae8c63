//! # Target Resolution
//!
//! Produces the ordered sequence of resource names a scope works through.
//! Every call to [`TargetSource::resolve`] starts from scratch, and the
//! sequence is lazy: discovery pages are fetched only as targets are consumed.
//!
//! - [`StaticTargets`] reads one name per record from a list shared by every
//!   scope. The list is read once, up front; an unreadable list is fatal for
//!   the whole run.
//! - [`DiscoveryTargets`] pages through the scope's own listing call until
//!   the provider reports no further pages. A listing failure surfaces as an
//!   `Err` item and ends the sequence.

use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::path::Path;

use lcw_core::ResourceId;

use crate::client::ResourceClient;
use crate::error::{EngineError, ProviderError};

/// One resolved target, or the listing failure that ended resolution.
pub type TargetItem = Result<ResourceId, ProviderError>;

/// A restartable, finite sequence of resource names.
pub trait TargetSource: std::fmt::Debug {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Start a fresh pass over the targets for the scope `client` belongs to.
    fn resolve<'a>(&'a self, client: &'a dyn ResourceClient)
        -> Box<dyn Iterator<Item = TargetItem> + 'a>;
}

// ---------------------------------------------------------------------------
// StaticTargets
// ---------------------------------------------------------------------------

/// Target names read from a record-per-line list.
///
/// The first field of each record is used. Surrounding whitespace is trimmed
/// and blank records are skipped. There is no header handling: a header row
/// is treated as a name like any other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTargets {
    location: String,
    targets: Vec<ResourceId>,
}

impl StaticTargets {
    /// Read a target list from a file.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let location = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| EngineError::SourceUnavailable {
            location: location.clone(),
            reason: e.to_string(),
        })?;
        Self::from_reader(location, file)
    }

    /// Read a target list from any reader.
    pub fn from_reader<R: Read>(location: impl Into<String>, reader: R) -> Result<Self, EngineError> {
        let location = location.into();
        let mut records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut targets = Vec::new();
        for (idx, record) in records.records().enumerate() {
            let record = record.map_err(|e| EngineError::SourceUnavailable {
                location: location.clone(),
                reason: format!("record {}: {e}", idx + 1),
            })?;
            let Some(first) = record.get(0) else {
                continue;
            };
            let first = if idx == 0 {
                first.trim_start_matches('\u{feff}')
            } else {
                first
            };
            if let Some(id) = ResourceId::parse(first) {
                targets.push(id);
            }
        }

        tracing::debug!(location = %location, count = targets.len(), "loaded static target list");
        Ok(Self { location, targets })
    }

    /// Build a list from names already in memory.
    pub fn from_ids(location: impl Into<String>, ids: impl IntoIterator<Item = ResourceId>) -> Self {
        Self {
            location: location.into(),
            targets: ids.into_iter().collect(),
        }
    }

    /// The resolved names, in list order.
    pub fn targets(&self) -> &[ResourceId] {
        &self.targets
    }
}

impl TargetSource for StaticTargets {
    fn describe(&self) -> String {
        format!("static list {} ({} targets)", self.location, self.targets.len())
    }

    fn resolve<'a>(
        &'a self,
        _client: &'a dyn ResourceClient,
    ) -> Box<dyn Iterator<Item = TargetItem> + 'a> {
        Box::new(self.targets.iter().cloned().map(Ok))
    }
}

// ---------------------------------------------------------------------------
// DiscoveryTargets
// ---------------------------------------------------------------------------

/// Target names discovered by paginated listing in each scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryTargets;

impl TargetSource for DiscoveryTargets {
    fn describe(&self) -> String {
        "discovery".to_string()
    }

    fn resolve<'a>(
        &'a self,
        client: &'a dyn ResourceClient,
    ) -> Box<dyn Iterator<Item = TargetItem> + 'a> {
        Box::new(PageWalker::new(client))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Fetching,
    Exhausted,
}

/// Flattens listing pages into a single sequence of names.
struct PageWalker<'a> {
    client: &'a dyn ResourceClient,
    buffered: VecDeque<ResourceId>,
    next_token: Option<String>,
    seen_tokens: HashSet<String>,
    pages: usize,
    state: WalkState,
}

impl<'a> PageWalker<'a> {
    fn new(client: &'a dyn ResourceClient) -> Self {
        Self {
            client,
            buffered: VecDeque::new(),
            next_token: None,
            seen_tokens: HashSet::new(),
            pages: 0,
            state: WalkState::Fetching,
        }
    }
}

impl Iterator for PageWalker<'_> {
    type Item = TargetItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.buffered.pop_front() {
                return Some(Ok(id));
            }
            if self.state == WalkState::Exhausted {
                return None;
            }

            let token = self.next_token.take();
            let page = match self.client.list_page(token.as_deref()) {
                Ok(page) => page,
                Err(e) => {
                    self.state = WalkState::Exhausted;
                    return Some(Err(e));
                }
            };
            self.pages += 1;

            // Any token handed out twice means the listing cycles.
            if let Some(next) = &page.next_token {
                if !self.seen_tokens.insert(next.clone()) {
                    self.state = WalkState::Exhausted;
                    return Some(Err(ProviderError::Rejected {
                        resource: "listing".to_string(),
                        message: format!(
                            "pagination token {next:?} repeated after page {}",
                            self.pages
                        ),
                    }));
                }
            }

            tracing::trace!(page = self.pages, items = page.items.len(), "fetched listing page");
            self.buffered.extend(page.items);
            match page.next_token {
                Some(next) => self.next_token = Some(next),
                None => self.state = WalkState::Exhausted,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Page;
    use lcw_core::{DesiredPolicy, ObservedState};
    use proptest::prelude::*;
    use std::cell::Cell;
    use std::io::Write;

    /// Client that serves fixed pages; token `n` addresses page `n`.
    struct PagedClient {
        pages: Vec<Vec<&'static str>>,
        fail_at: Option<usize>,
        stuck: bool,
        cycle: bool,
        calls: Cell<usize>,
    }

    impl PagedClient {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                fail_at: None,
                stuck: false,
                cycle: false,
                calls: Cell::new(0),
            }
        }
    }

    impl ResourceClient for PagedClient {
        fn exists(&self, _id: &ResourceId) -> Result<bool, ProviderError> {
            Ok(true)
        }

        fn current_state(&self, _id: &ResourceId) -> Result<ObservedState, ProviderError> {
            Ok(ObservedState::Unknown)
        }

        fn put_desired_state(&self, _id: &ResourceId, _policy: &DesiredPolicy) -> Result<(), ProviderError> {
            Ok(())
        }

        fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError> {
            self.calls.set(self.calls.get() + 1);
            let idx: usize = token.map(|t| t.parse().unwrap()).unwrap_or(0);
            if self.fail_at == Some(idx) {
                return Err(ProviderError::Transient {
                    message: "connection reset".into(),
                });
            }
            let next_token = if self.stuck {
                Some("1".to_string())
            } else if self.cycle {
                Some(((idx + 1) % self.pages.len()).to_string())
            } else if idx + 1 < self.pages.len() {
                Some((idx + 1).to_string())
            } else {
                None
            };
            Ok(Page {
                items: self.pages[idx].iter().map(|s| ResourceId::new(*s)).collect(),
                next_token,
            })
        }
    }

    fn names(items: Vec<TargetItem>) -> Vec<String> {
        items
            .into_iter()
            .map(|i| i.unwrap().as_str().to_string())
            .collect()
    }

    #[test]
    fn static_list_trims_and_skips_blanks() {
        let data = "bucket-a\n\n bucket-b \n   \n";
        let list = StaticTargets::from_reader("inline", data.as_bytes()).unwrap();
        let got: Vec<&str> = list.targets().iter().map(ResourceId::as_str).collect();
        assert_eq!(got, vec!["bucket-a", "bucket-b"]);
    }

    #[test]
    fn static_list_uses_first_field_only() {
        let data = "bucket-a,prod,owner@example.com\n\"bucket-b\",staging\n";
        let list = StaticTargets::from_reader("inline", data.as_bytes()).unwrap();
        let got: Vec<&str> = list.targets().iter().map(ResourceId::as_str).collect();
        assert_eq!(got, vec!["bucket-a", "bucket-b"]);
    }

    #[test]
    fn static_list_keeps_header_row() {
        let data = "bucket_name\nbucket-a\n";
        let list = StaticTargets::from_reader("inline", data.as_bytes()).unwrap();
        assert_eq!(list.targets().len(), 2);
        assert_eq!(list.targets()[0].as_str(), "bucket_name");
    }

    #[test]
    fn static_list_strips_byte_order_mark() {
        let data = "\u{feff}bucket-a\nbucket-b\n";
        let list = StaticTargets::from_reader("inline", data.as_bytes()).unwrap();
        assert_eq!(list.targets()[0].as_str(), "bucket-a");
    }

    #[test]
    fn static_list_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = StaticTargets::from_path(&dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, EngineError::SourceUnavailable { .. }));
    }

    #[test]
    fn static_list_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bucket-a").unwrap();
        writeln!(file).unwrap();
        writeln!(file, " bucket-b ").unwrap();
        let list = StaticTargets::from_path(file.path()).unwrap();
        assert_eq!(list.targets().len(), 2);
    }

    #[test]
    fn static_resolve_is_restartable() {
        let list = StaticTargets::from_ids("mem", [ResourceId::new("a"), ResourceId::new("b")]);
        let client = PagedClient::new(vec![vec![]]);
        let first = names(list.resolve(&client).collect());
        let second = names(list.resolve(&client).collect());
        assert_eq!(first, second);
        assert_eq!(client.calls.get(), 0);
    }

    #[test]
    fn discovery_flattens_all_pages() {
        let client = PagedClient::new(vec![vec!["g1", "g2"], vec![], vec!["g3"]]);
        let got = names(DiscoveryTargets.resolve(&client).collect());
        assert_eq!(got, vec!["g1", "g2", "g3"]);
        assert_eq!(client.calls.get(), 3);
    }

    #[test]
    fn discovery_is_lazy() {
        let client = PagedClient::new(vec![vec!["g1"], vec!["g2"]]);
        let mut walker = DiscoveryTargets.resolve(&client);
        assert_eq!(walker.next().unwrap().unwrap().as_str(), "g1");
        assert_eq!(client.calls.get(), 1);
    }

    #[test]
    fn discovery_failure_ends_sequence_with_error() {
        let mut client = PagedClient::new(vec![vec!["g1"], vec!["g2"], vec!["g3"]]);
        client.fail_at = Some(1);
        let items: Vec<TargetItem> = DiscoveryTargets.resolve(&client).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().as_str(), "g1");
        assert!(matches!(items[1], Err(ProviderError::Transient { .. })));
    }

    #[test]
    fn discovery_detects_stuck_token() {
        let mut client = PagedClient::new(vec![vec!["g1"], vec!["g2"]]);
        client.stuck = true;
        let items: Vec<TargetItem> = DiscoveryTargets.resolve(&client).collect();
        assert!(matches!(items.last(), Some(Err(ProviderError::Rejected { .. }))));
        assert!(client.calls.get() <= 3);
    }

    #[test]
    fn discovery_detects_cycling_tokens() {
        let mut client = PagedClient::new(vec![vec!["g1"], vec!["g2"]]);
        client.cycle = true;
        let items: Vec<TargetItem> = DiscoveryTargets.resolve(&client).take(100).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().as_str(), "g1");
        assert_eq!(items[1].as_ref().unwrap().as_str(), "g2");
        assert!(matches!(items[2], Err(ProviderError::Rejected { .. })));
        assert_eq!(client.calls.get(), 3);
    }

    proptest! {
        /// Blank and whitespace-only records never reach the target list, and order is kept.
        #[test]
        fn static_list_excludes_blanks_and_keeps_order(
            entries in proptest::collection::vec(
                prop_oneof![
                    "[a-z][a-z0-9-]{0,12}".prop_map(|s| (s, true)),
                    "[ \t]{0,4}".prop_map(|s| (s, false)),
                ],
                0..20,
            ),
            pad in "[ \t]{0,3}",
        ) {
            let data: String = entries
                .iter()
                .map(|(s, _)| format!("{pad}{s}{pad}\n"))
                .collect();
            let expected: Vec<String> = entries
                .iter()
                .filter(|(_, real)| *real)
                .map(|(s, _)| s.clone())
                .collect();
            let list = StaticTargets::from_reader("prop", data.as_bytes()).unwrap();
            let got: Vec<String> = list.targets().iter().map(|t| t.as_str().to_string()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
