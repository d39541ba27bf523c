//! Change detection between freshly scraped and last published gate schedules.

pub mod config;
pub mod diff;
pub mod policy;
pub mod publish;
pub mod run;

pub use config::{BaselineConfig, BaselineKind, DetectConfig};
pub use diff::{
    compare_snapshots, diff, ChangeReport, Comparison, DiffDetails, DiffResult, ModifiedRecord,
    SnapshotDiff, DEFAULT_SAMPLE_LIMIT,
};
pub use policy::{BaselineState, ChangePolicy, Decision, Evaluation};
pub use publish::{build_snapshots, parse_rows, write_snapshots, BuiltSnapshots};
pub use run::{
    ChangeDetector, DetectError, FileEvaluation, OutputSignal, RunOutcome, RunTally, SkippedFile,
    EXIT_CHANGED, EXIT_ERROR, EXIT_INPUT_MISSING, EXIT_UNCHANGED,
};

pub const CRATE_NAME: &str = "gatewatch-detect";

