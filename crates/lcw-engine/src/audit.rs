//! # Audit Log
//!
//! Every outcome of a run is handed to an [`AuditLog`] before the next target
//! is processed. A sink that cannot record an outcome stops the run: an
//! audit trail with gaps is worse than an interrupted run.
//!
//! Two sinks are provided:
//!
//! - [`MemoryAuditLog`]: in-process, queryable. Used by tests and by callers
//!   that post-process a run.
//! - [`JsonLinesAuditLog`]: one JSON object per line, flushed per record.
//!   The CLI writes one file per run, named by [`audit_file_name`].

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use lcw_core::{EnforcementOutcome, FailureCause, ResourceId, Scope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;

// ---------------------------------------------------------------------------
// AuditRecord
// ---------------------------------------------------------------------------

/// One recorded outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Identifier shared by every record of one run.
    pub run_id: Uuid,
    /// Scope the outcome belongs to.
    pub scope: Scope,
    /// The target, or `None` for scope-level failures.
    pub target: Option<ResourceId>,
    /// What happened.
    pub outcome: EnforcementOutcome,
    /// UTC time the outcome was produced.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a record stamped with the current UTC time.
    pub fn new(
        run_id: Uuid,
        scope: Scope,
        target: Option<ResourceId>,
        outcome: EnforcementOutcome,
    ) -> Self {
        Self {
            run_id,
            scope,
            target,
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// Failure cause, when the outcome is a failure.
    pub fn cause(&self) -> Option<FailureCause> {
        match &self.outcome {
            EnforcementOutcome::Failed(f) => Some(f.cause),
            _ => None,
        }
    }
}

/// Destination for outcome records.
pub trait AuditLog {
    /// Record one outcome. Returning an error stops the run.
    fn record(&mut self, record: &AuditRecord) -> Result<(), AuditError>;
}

// ---------------------------------------------------------------------------
// MemoryAuditLog
// ---------------------------------------------------------------------------

/// Audit log held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    records: Vec<AuditRecord>,
}

impl MemoryAuditLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, in the order they were written.
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Return whether no records were written.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for a specific target name.
    pub fn for_target(&self, target: &str) -> Vec<&AuditRecord> {
        self.records
            .iter()
            .filter(|r| r.target.as_ref().map(ResourceId::as_str) == Some(target))
            .collect()
    }

    /// Records whose outcome carries the given label
    /// (`applied`, `skipped` or `failed`).
    pub fn with_label(&self, label: &str) -> Vec<&AuditRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome.label() == label)
            .collect()
    }

    /// Count of records with the given label.
    pub fn count(&self, label: &str) -> usize {
        self.with_label(label).len()
    }

    /// Records for one scope.
    pub fn for_scope(&self, scope: &Scope) -> Vec<&AuditRecord> {
        self.records.iter().filter(|r| &r.scope == scope).collect()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&mut self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonLinesAuditLog
// ---------------------------------------------------------------------------

/// Audit log that writes one JSON object per line.
pub struct JsonLinesAuditLog<W: Write> {
    writer: W,
    written: usize,
}

impl JsonLinesAuditLog<std::io::BufWriter<std::fs::File>> {
    /// Create (or truncate) an audit file, creating parent directories.
    pub fn create(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        Ok(Self::new(std::io::BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesAuditLog<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Number of records written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> std::fmt::Debug for JsonLinesAuditLog<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesAuditLog")
            .field("written", &self.written)
            .finish()
    }
}

impl<W: Write> AuditLog for JsonLinesAuditLog<W> {
    fn record(&mut self, record: &AuditRecord) -> Result<(), AuditError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}

/// File name for a run's audit file: `<task>_<YYYYmmdd_HHMMSS>.jsonl`.
///
/// Characters outside `[A-Za-z0-9._-]` in the task name become `_`.
pub fn audit_file_name(task: &str, at: DateTime<Utc>) -> String {
    let safe: String = task
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}_{}.jsonl", at.format("%Y%m%d_%H%M%S"))
}
