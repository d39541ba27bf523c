//! Core flight-schedule model and canonicalization for gatewatch.

pub mod consolidate;
pub mod identity;
pub mod record;
pub mod snapshot;

pub use consolidate::{consolidate, row_date, ConsolidatedSchedule, SlotKey};
pub use identity::{DuplicateKeyWarning, IdentityKey, KeyScheme, KeyedRecords};
pub use record::{CanonicalRecord, CodeshareFlight, RawFlightRecord, RecordParseError};
pub use snapshot::{
    format_display_line, RecordWarning, Snapshot, SnapshotParseError, Summary, EVENING_CUTOFF_HOUR,
};

pub const CRATE_NAME: &str = "gatewatch-core";
