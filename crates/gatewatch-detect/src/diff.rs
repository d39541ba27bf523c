//! Set difference between a baseline and a fresh snapshot.

use gatewatch_core::{CanonicalRecord, DuplicateKeyWarning, KeyScheme, KeyedRecords, Snapshot};
use serde::Serialize;

pub const DEFAULT_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifiedRecord {
    pub old: CanonicalRecord,
    pub new: CanonicalRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: Vec<CanonicalRecord>,
    pub removed: Vec<CanonicalRecord>,
    pub modified: Vec<ModifiedRecord>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn into_result(self, sample_limit: usize) -> DiffResult {
        DiffResult {
            added: self.added.len(),
            removed: self.removed.len(),
            modified: self.modified.len(),
            details: DiffDetails {
                added: self.added.into_iter().take(sample_limit).collect(),
                removed: self.removed.into_iter().take(sample_limit).collect(),
                modified: self.modified.into_iter().take(sample_limit).collect(),
            },
        }
    }
}

/// Added keys and modified pairs follow `new`'s order; removed keys follow `old`'s.
pub fn diff(old: &KeyedRecords, new: &KeyedRecords) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    for (key, fresh) in new.iter() {
        match old.get(key) {
            None => result.added.push(fresh.clone()),
            Some(previous) if previous != fresh => result.modified.push(ModifiedRecord {
                old: previous.clone(),
                new: fresh.clone(),
            }),
            Some(_) => {}
        }
    }

    for (key, previous) in old.iter() {
        if !new.contains_key(key) {
            result.removed.push(previous.clone());
        }
    }

    result
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub details: DiffDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffDetails {
    pub added: Vec<CanonicalRecord>,
    pub removed: Vec<CanonicalRecord>,
    pub modified: Vec<ModifiedRecord>,
}

impl DiffResult {
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.removed > 0 || self.modified > 0
    }
}

/// Per-file outcome. `flights_changed` always equals `flight_changes.has_changes()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
    pub summary_changed: bool,
    pub flights_changed: bool,
    pub flight_changes: DiffResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChangeReport {
    pub fn from_diff(summary_changed: bool, diff: SnapshotDiff, sample_limit: usize) -> Self {
        let flight_changes = diff.into_result(sample_limit);
        Self {
            summary_changed,
            flights_changed: flight_changes.has_changes(),
            flight_changes,
            reason: None,
        }
    }

    pub fn without_baseline(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.summary_changed || self.flights_changed
    }
}

#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub report: ChangeReport,
    pub baseline_key_warnings: Vec<DuplicateKeyWarning>,
    pub fresh_key_warnings: Vec<DuplicateKeyWarning>,
}

pub fn compare_snapshots(
    baseline: &Snapshot,
    fresh: &Snapshot,
    scheme: KeyScheme,
    sample_limit: usize,
) -> Comparison {
    let old = KeyedRecords::build(baseline.flights.iter().cloned(), scheme);
    let new = KeyedRecords::build(fresh.flights.iter().cloned(), scheme);
    let summary_changed = baseline.summary.differs_from(&fresh.summary);

    Comparison {
        report: ChangeReport::from_diff(summary_changed, diff(&old, &new), sample_limit),
        baseline_key_warnings: old.warnings().to_vec(),
        fresh_key_warnings: new.warnings().to_vec(),
    }
}
