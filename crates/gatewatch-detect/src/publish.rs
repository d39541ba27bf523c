//! Turning an unconsolidated scraper stream into per-date snapshot files.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use gatewatch_core::{consolidate, RawFlightRecord, RecordWarning, Snapshot};
use gatewatch_storage::{SnapshotStore, StoredSnapshot};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct BuiltSnapshots {
    pub snapshots: Vec<Snapshot>,
    pub warnings: Vec<RecordWarning>,
}

/// Accepts either a bare array of rows or an object with a `flights` array.
pub fn parse_rows(text: &str) -> Result<Vec<JsonValue>> {
    let value: JsonValue = serde_json::from_str(text).context("parsing raw rows")?;
    match value {
        JsonValue::Array(rows) => Ok(rows),
        JsonValue::Object(mut obj) => match obj.remove("flights") {
            Some(JsonValue::Array(rows)) => Ok(rows),
            _ => bail!("raw rows object has no `flights` array"),
        },
        _ => bail!("raw rows must be a JSON array"),
    }
}

pub fn build_snapshots(rows: &[JsonValue], fallback_date: &str, now: DateTime<Utc>) -> BuiltSnapshots {
    let mut warnings = Vec::new();
    let mut parsed = Vec::with_capacity(rows.len());
    for (index, value) in rows.iter().enumerate() {
        match RawFlightRecord::from_value(value) {
            Ok(row) => parsed.push(row),
            Err(err) => warnings.push(RecordWarning {
                index,
                message: err.to_string(),
            }),
        }
    }

    let snapshots = consolidate(&parsed, fallback_date)
        .into_dates()
        .into_iter()
        .map(|(date, flights)| Snapshot::build(date, flights, now))
        .collect();

    BuiltSnapshots {
        snapshots,
        warnings,
    }
}

pub async fn write_snapshots(store: &SnapshotStore, built: &BuiltSnapshots) -> Result<Vec<StoredSnapshot>> {
    for warning in &built.warnings {
        warn!(index = warning.index, message = %warning.message, "skipped raw row");
    }
    let mut stored = Vec::with_capacity(built.snapshots.len());
    for snapshot in &built.snapshots {
        let written = store.write_snapshot(snapshot).await?;
        info!(
            date = %snapshot.date,
            path = %written.path.display(),
            total = snapshot.summary.total_flights,
            before_cutoff = snapshot.summary.before_cutoff,
            after_cutoff = snapshot.summary.after_cutoff,
            "snapshot written"
        );
        stored.push(written);
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 4, 0, 0).single().expect("ts")
    }

    #[test]
    fn builds_one_snapshot_per_date_with_codeshares_counted_once() {
        let rows = parse_rows(
            &json!([
                {"datetime": "2026-02-01T18:05:00", "time": "18:05", "gate": "D12", "flight_code": "CI100", "airline_code": "CI"},
                {"datetime": "2026-02-01T06:30:00", "time": "06:30", "gate": "D16", "flight_code": "BR178", "airline_code": "BR", "airline_name": "長榮航空"},
                {"datetime": "2026-02-01T06:30:00", "time": "06:30", "gate": "D16", "flight_code": "NH5803", "airline_code": "NH"},
                {"datetime": "2026-02-02T07:00:00", "time": "07:00", "gate": "D11", "flight_code": "BR100"},
                ["not", "a", "row"],
            ])
            .to_string(),
        )
        .expect("rows");

        let built = build_snapshots(&rows, "2026-02-01", now());
        assert_eq!(built.warnings.len(), 1);
        assert_eq!(built.warnings[0].index, 4);
        assert_eq!(built.snapshots.len(), 2);

        let first = &built.snapshots[0];
        assert_eq!(first.date, "2026-02-01");
        assert_eq!(first.summary.total_flights, 2);
        assert_eq!(first.summary.before_cutoff, 1);
        assert_eq!(first.summary.after_cutoff, 1);
        assert_eq!(first.flights[0].flight_code, "BR178");
        assert_eq!(first.flights[0].codeshare_flights[0].flight_code, "NH5803");
        assert_eq!(first.formatted_display[0], "06:30 : D16 : BR178 (長榮航空)");
        assert_eq!(built.snapshots[1].date, "2026-02-02");
    }

    #[test]
    fn accepts_wrapped_rows_and_rejects_scalars() {
        let wrapped = parse_rows(r#"{"flights": [{"flight_code": "BR178"}]}"#).expect("wrapped");
        assert_eq!(wrapped.len(), 1);
        assert!(parse_rows("42").is_err());
        assert!(parse_rows(r#"{"rows": []}"#).is_err());
    }

    #[tokio::test]
    async fn writes_snapshots_through_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path(), gatewatch_storage::DateFileLayout::default());
        let rows = parse_rows(r#"[{"time": "06:30", "gate": "D16", "flight_code": "BR178"}]"#).expect("rows");
        let built = build_snapshots(&rows, "2026-02-03", now());
        let stored = write_snapshots(&store, &built).await.expect("write");
        assert_eq!(stored.len(), 1);
        assert!(dir.path().join("flight-data-2026-02-03.json").exists());
    }

    #[tokio::test]
    async fn malformed_row_dates_land_in_the_fallback_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path(), gatewatch_storage::DateFileLayout::default());
        let rows = parse_rows(
            &json!([
                {"time": "07:00", "gate": "D11", "flight_code": "BR100"},
                {"datetime": "2026/02/01 06:30", "time": "06:30", "gate": "D16", "flight_code": "BR178"},
                {"date": "../../escaped", "time": "08:15", "gate": "D12", "flight_code": "CI7"},
            ])
            .to_string(),
        )
        .expect("rows");

        let built = build_snapshots(&rows, "2026-02-01", now());
        assert_eq!(built.snapshots.len(), 1);
        let stored = write_snapshots(&store, &built).await.expect("write");
        assert_eq!(stored.len(), 1);
        assert_eq!(built.snapshots[0].summary.total_flights, 3);

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("list")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["flight-data-2026-02-01.json"]);
    }
}
