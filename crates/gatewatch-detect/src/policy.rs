//! Publish / do-not-publish decision per date file.

use std::fmt;
use std::str::FromStr;

use gatewatch_core::{DuplicateKeyWarning, KeyScheme, Snapshot};
use gatewatch_storage::BaselineError;
use serde::{Deserialize, Serialize};

use crate::diff::{compare_snapshots, ChangeReport, DEFAULT_SAMPLE_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Changed,
    Unchanged,
}

impl Decision {
    pub fn from_changed(changed: bool) -> Self {
        if changed {
            Decision::Changed
        } else {
            Decision::Unchanged
        }
    }

    pub fn is_changed(self) -> bool {
        self == Decision::Changed
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Decision::Changed => "changed",
            Decision::Unchanged => "unchanged",
        })
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "changed" => Ok(Decision::Changed),
            "unchanged" => Ok(Decision::Unchanged),
            other => Err(format!("unknown decision `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BaselineState {
    Present(Box<Snapshot>),
    NoBaselineFile,
    RetrievalTimeout,
    RetrievalError(String),
    Malformed(String),
}

impl BaselineState {
    /// Folds a retrieval result into a state. Blank content counts as absent.
    pub fn from_retrieval(result: Result<String, BaselineError>) -> Self {
        match result {
            Ok(text) if text.trim().is_empty() => BaselineState::NoBaselineFile,
            Ok(text) => match Snapshot::parse(&text) {
                Ok(snapshot) => BaselineState::Present(Box::new(snapshot)),
                Err(err) => BaselineState::Malformed(err.to_string()),
            },
            Err(BaselineError::NotFound(_)) => BaselineState::NoBaselineFile,
            Err(BaselineError::Timeout { .. }) => BaselineState::RetrievalTimeout,
            Err(BaselineError::Undecodable { message, .. }) => BaselineState::Malformed(message),
            Err(BaselineError::Other { message, .. }) => BaselineState::RetrievalError(message),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BaselineState::Present(_) => "present",
            BaselineState::NoBaselineFile => "missing",
            BaselineState::RetrievalTimeout => "timeout",
            BaselineState::RetrievalError(_) => "retrieval_error",
            BaselineState::Malformed(_) => "malformed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangePolicy {
    pub key_scheme: KeyScheme,
    pub sample_limit: usize,
    pub unreachable_baseline: Decision,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self {
            key_scheme: KeyScheme::TimeGate,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            unreachable_baseline: Decision::Unchanged,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub baseline: &'static str,
    pub report: ChangeReport,
    pub key_warnings: Vec<DuplicateKeyWarning>,
}

impl ChangePolicy {
    /// Missing or malformed baselines publish whenever the fresh snapshot has
    /// flights. Unreachable baselines resolve to `unreachable_baseline`.
    pub fn evaluate(&self, baseline: &BaselineState, fresh: &Snapshot) -> Evaluation {
        let label = baseline.label();
        match baseline {
            BaselineState::Present(previous) => {
                let comparison =
                    compare_snapshots(previous, fresh, self.key_scheme, self.sample_limit);
                let mut key_warnings = comparison.baseline_key_warnings;
                key_warnings.extend(comparison.fresh_key_warnings);
                Evaluation {
                    decision: Decision::from_changed(comparison.report.has_changes()),
                    baseline: label,
                    report: comparison.report,
                    key_warnings,
                }
            }
            BaselineState::NoBaselineFile => self.untrusted_content(
                label,
                fresh,
                "no baseline exists".to_string(),
            ),
            BaselineState::Malformed(detail) => {
                self.untrusted_content(label, fresh, format!("baseline is malformed: {detail}"))
            }
            BaselineState::RetrievalTimeout => {
                self.unreachable(label, "baseline retrieval timed out".to_string())
            }
            BaselineState::RetrievalError(detail) => {
                self.unreachable(label, format!("baseline retrieval failed: {detail}"))
            }
        }
    }

    fn untrusted_content(&self, label: &'static str, fresh: &Snapshot, cause: String) -> Evaluation {
        let (decision, reason) = if fresh.has_flights() {
            (
                Decision::Changed,
                format!("{cause}; new snapshot has {} flights", fresh.flights.len()),
            )
        } else {
            (Decision::Unchanged, format!("{cause}; new snapshot is empty"))
        };
        Evaluation {
            decision,
            baseline: label,
            report: ChangeReport::without_baseline(reason),
            key_warnings: Vec::new(),
        }
    }

    fn unreachable(&self, label: &'static str, reason: String) -> Evaluation {
        Evaluation {
            decision: self.unreachable_baseline,
            baseline: label,
            report: ChangeReport::without_baseline(reason),
            key_warnings: Vec::new(),
        }
    }
}
