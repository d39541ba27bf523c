//! Per-date-file evaluation loop and the publish signal it produces.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use gatewatch_core::{DuplicateKeyWarning, RecordWarning, Snapshot};
use gatewatch_storage::{fetch_baseline_with_timeout, BaselineSource, DateFile, DateFileLayout, DiscoveryError};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::DetectConfig;
use crate::diff::ChangeReport;
use crate::policy::{BaselineState, ChangePolicy, Decision};

/// Exit status meaning "changes detected, publish".
pub const EXIT_CHANGED: i32 = 0;
/// Exit status meaning "nothing to publish". Not an error.
pub const EXIT_UNCHANGED: i32 = 1;
/// Exit status for a run that could not evaluate anything.
pub const EXIT_INPUT_MISSING: i32 = 2;
/// Exit status for any other failure, including failing to publish the signal.
pub const EXIT_ERROR: i32 = 3;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("input directory {0} does not exist")]
    InputDirectoryMissing(PathBuf),
    #[error(transparent)]
    Discovery(DiscoveryError),
}

impl From<DiscoveryError> for DetectError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::DirectoryMissing(path) => DetectError::InputDirectoryMissing(path),
            other => DetectError::Discovery(other),
        }
    }
}

impl DetectError {
    pub fn exit_code(&self) -> i32 {
        EXIT_INPUT_MISSING
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEvaluation {
    pub file: String,
    pub date: String,
    pub decision: Decision,
    pub baseline: &'static str,
    pub changes: ChangeReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub record_warnings: Vec<RecordWarning>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub key_warnings: Vec<DuplicateKeyWarning>,
}

impl FileEvaluation {
    pub fn render(&self) -> String {
        let mut lines = vec![format!(
            "{}: {} (baseline {})",
            self.file, self.decision, self.baseline
        )];
        if let Some(reason) = &self.changes.reason {
            lines.push(format!("  reason: {reason}"));
        }
        if self.changes.flights_changed {
            let fc = &self.changes.flight_changes;
            lines.push(format!("  added: {}", fc.added));
            lines.push(format!("  removed: {}", fc.removed));
            lines.push(format!("  modified: {}", fc.modified));
            for record in &fc.details.added {
                lines.push(format!("    + {}", gatewatch_core::format_display_line(record)));
            }
            for record in &fc.details.removed {
                lines.push(format!("    - {}", gatewatch_core::format_display_line(record)));
            }
            for pair in &fc.details.modified {
                lines.push(format!(
                    "    ~ {} [{} -> {}]",
                    gatewatch_core::format_display_line(&pair.new),
                    pair.old.status,
                    pair.new.status
                ));
            }
        }
        if self.changes.summary_changed {
            lines.push("  summary changed".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunTally {
    pub evaluated: usize,
    pub skipped: usize,
    pub changed_files: Vec<String>,
}

impl RunTally {
    pub fn record(mut self, evaluation: &FileEvaluation) -> Self {
        self.evaluated += 1;
        if evaluation.decision.is_changed() {
            self.changed_files.push(evaluation.file.clone());
        }
        self
    }

    pub fn skip(mut self) -> Self {
        self.skipped += 1;
        self
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_files.is_empty()
    }

    pub fn changed_count(&self) -> usize {
        self.changed_files.len()
    }

    pub fn signal(&self) -> OutputSignal {
        OutputSignal {
            has_changes: self.has_changes(),
            changed_count: self.changed_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSignal {
    pub has_changes: bool,
    pub changed_count: usize,
}

impl OutputSignal {
    pub fn to_key_values(&self) -> String {
        format!(
            "has_changes={}\nchanged_count={}\n",
            self.has_changes, self.changed_count
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_changes {
            EXIT_CHANGED
        } else {
            EXIT_UNCHANGED
        }
    }

    pub async fn append_to(&self, path: &Path) -> anyhow::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("opening signal output {}", path.display()))?;
        file.write_all(self.to_key_values().as_bytes())
            .await
            .with_context(|| format!("writing signal output {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing signal output {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub evaluations: Vec<FileEvaluation>,
    pub skipped: Vec<SkippedFile>,
    pub tally: RunTally,
}

impl RunOutcome {
    pub fn signal(&self) -> OutputSignal {
        self.tally.signal()
    }

    pub fn exit_code(&self) -> i32 {
        self.signal().exit_code()
    }

    pub fn render(&self) -> String {
        let mut blocks: Vec<String> = self.evaluations.iter().map(FileEvaluation::render).collect();
        for skipped in &self.skipped {
            blocks.push(format!("{}: skipped ({})", skipped.file, skipped.reason));
        }
        blocks.push(if self.tally.has_changes() {
            format!("total: {} file(s) changed", self.tally.changed_count())
        } else {
            "total: no file changed".to_string()
        });
        blocks.join("\n")
    }
}

pub struct ChangeDetector {
    data_dir: PathBuf,
    layout: DateFileLayout,
    baseline: Box<dyn BaselineSource>,
    baseline_timeout: Duration,
    policy: ChangePolicy,
}

impl ChangeDetector {
    pub fn new(config: &DetectConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            layout: config.layout(),
            baseline: config.baseline_source(),
            baseline_timeout: config.baseline_timeout(),
            policy: config.policy(),
        }
    }

    pub fn with_baseline_source(mut self, source: Box<dyn BaselineSource>) -> Self {
        self.baseline = source;
        self
    }

    pub async fn run_once(&self) -> Result<RunOutcome, DetectError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("detect_run", %run_id, data_dir = %self.data_dir.display());
        self.run_files(run_id).instrument(span).await
    }

    async fn run_files(&self, run_id: Uuid) -> Result<RunOutcome, DetectError> {
        let started_at = Utc::now();
        let files = self.layout.list(&self.data_dir).await?;
        info!(files = files.len(), baseline = %self.baseline.describe(), "evaluating date files");
        if files.is_empty() {
            warn!("no date files found");
        }

        let mut tally = RunTally::default();
        let mut evaluations = Vec::with_capacity(files.len());
        let mut skipped = Vec::new();

        for file in &files {
            match self.evaluate_file(file).await {
                Ok(evaluation) => {
                    tally = tally.record(&evaluation);
                    evaluations.push(evaluation);
                }
                Err(skip) => {
                    warn!(file = %skip.file, reason = %skip.reason, "skipping date file");
                    tally = tally.skip();
                    skipped.push(skip);
                }
            }
        }

        info!(
            changed = tally.changed_count(),
            evaluated = tally.evaluated,
            skipped = tally.skipped,
            "run complete"
        );

        Ok(RunOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            evaluations,
            skipped,
            tally,
        })
    }

    /// Evaluates one file. Only an unreadable fresh snapshot is an `Err`;
    /// every baseline problem resolves to a decision.
    pub async fn evaluate_file(&self, file: &DateFile) -> Result<FileEvaluation, SkippedFile> {
        let skip = |reason: String| SkippedFile {
            file: file.file_name.clone(),
            reason,
        };
        let text = fs::read_to_string(&file.path)
            .await
            .map_err(|err| skip(format!("reading {}: {err}", file.path.display())))?;
        let fresh = Snapshot::parse(&text).map_err(|err| skip(err.to_string()))?;

        let retrieval =
            fetch_baseline_with_timeout(self.baseline.as_ref(), &file.file_name, self.baseline_timeout).await;
        if let Err(err) = &retrieval {
            debug!(file = %file.file_name, %err, "baseline unavailable");
        }
        let state = BaselineState::from_retrieval(retrieval);
        let evaluation = self.policy.evaluate(&state, &fresh);

        let mut record_warnings = fresh.warnings.clone();
        if let BaselineState::Present(previous) = &state {
            record_warnings.extend(previous.warnings.iter().cloned());
        }
        for warning in &record_warnings {
            warn!(file = %file.file_name, index = warning.index, message = %warning.message, "skipped flight record");
        }
        for warning in &evaluation.key_warnings {
            warn!(file = %file.file_name, %warning, "duplicate identity key");
        }

        let result = FileEvaluation {
            file: file.file_name.clone(),
            date: file.date.clone(),
            decision: evaluation.decision,
            baseline: evaluation.baseline,
            changes: evaluation.report,
            record_warnings,
            key_warnings: evaluation.key_warnings,
        };
        info!(
            file = %result.file,
            decision = %result.decision,
            baseline = result.baseline,
            added = result.changes.flight_changes.added,
            removed = result.changes.flight_changes.removed,
            modified = result.changes.flight_changes.modified,
            summary_changed = result.changes.summary_changed,
            "evaluated"
        );
        Ok(result)
    }
}
