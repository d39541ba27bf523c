//! Per-date snapshots and the persisted JSON document they round-trip through.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::consolidate::consolidate;
use crate::record::{CanonicalRecord, RawFlightRecord};

/// Departures at or after this hour count toward `after_17:00`.
pub const EVENING_CUTOFF_HOUR: u32 = 17;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub total_flights: u64,
    #[serde(default, rename = "before_17:00")]
    pub before_cutoff: u64,
    #[serde(default, rename = "after_17:00")]
    pub after_cutoff: u64,
}

impl Summary {
    /// Times that do not parse as `HH:MM[:SS]` count toward the total only.
    pub fn from_records(records: &[CanonicalRecord]) -> Self {
        let mut summary = Summary {
            total_flights: records.len() as u64,
            ..Default::default()
        };
        for record in records {
            match departs_before_cutoff(&record.time) {
                Some(true) => summary.before_cutoff += 1,
                Some(false) => summary.after_cutoff += 1,
                None => {}
            }
        }
        summary
    }

    pub fn differs_from(&self, other: &Summary) -> bool {
        self.total_flights != other.total_flights
            || self.before_cutoff != other.before_cutoff
            || self.after_cutoff != other.after_cutoff
    }
}

fn departs_before_cutoff(time: &str) -> Option<bool> {
    let parsed = NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .ok()?;
    Some(parsed.hour() < EVENING_CUTOFF_HOUR)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordWarning {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SnapshotParseError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot document must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    date: String,
    #[serde(default)]
    flights: Vec<JsonValue>,
    #[serde(default)]
    summary: Summary,
    #[serde(default)]
    formatted_display: Vec<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// `formatted_display` and `updated_at` are carried for persistence only and
/// never take part in comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub date: String,
    pub flights: Vec<CanonicalRecord>,
    pub summary: Summary,
    pub formatted_display: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip)]
    pub warnings: Vec<RecordWarning>,
}

impl Snapshot {
    /// Parses persisted snapshot text. Individual bad records are skipped and
    /// reported in `warnings`; only a document that is not a JSON object of the
    /// expected shape is an error.
    pub fn parse(text: &str) -> Result<Self, SnapshotParseError> {
        let value: JsonValue = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(SnapshotParseError::NotAnObject);
        }
        let doc: SnapshotDocument = serde_json::from_value(value)?;
        Ok(Self::from_document(doc))
    }

    fn from_document(doc: SnapshotDocument) -> Self {
        let mut warnings = Vec::new();
        let mut rows = Vec::with_capacity(doc.flights.len());
        for (index, value) in doc.flights.iter().enumerate() {
            match RawFlightRecord::from_value(value) {
                Ok(row) => rows.push(row),
                Err(err) => warnings.push(RecordWarning {
                    index,
                    message: err.to_string(),
                }),
            }
        }

        Self {
            flights: consolidate(&rows, &doc.date).into_records(),
            date: doc.date,
            summary: doc.summary,
            formatted_display: doc.formatted_display,
            updated_at: doc.updated_at,
            warnings,
        }
    }

    pub fn build(date: impl Into<String>, mut flights: Vec<CanonicalRecord>, updated_at: DateTime<Utc>) -> Self {
        flights.sort_by(|a, b| a.time.cmp(&b.time));
        let summary = Summary::from_records(&flights);
        let formatted_display = flights.iter().map(format_display_line).collect();
        Self {
            date: date.into(),
            flights,
            summary,
            formatted_display,
            updated_at: Some(updated_at.to_rfc3339()),
            warnings: Vec::new(),
        }
    }

    pub fn has_flights(&self) -> bool {
        !self.flights.is_empty()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// `06:30 : D16 : BR178 (長榮航空)`
pub fn format_display_line(record: &CanonicalRecord) -> String {
    let mut line = format!("{} : {} : {}", record.time, record.gate, record.flight_code);
    let airline = record.airline_display();
    if !airline.is_empty() {
        line.push_str(&format!(" ({airline})"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn rec(time: &str, gate: &str, code: &str) -> CanonicalRecord {
        CanonicalRecord {
            time: time.into(),
            gate: gate.into(),
            flight_code: code.into(),
            airline_code: "BR".into(),
            ..Default::default()
        }
    }

    #[test]
    fn summary_splits_at_seventeen_hundred() {
        let summary = Summary::from_records(&[
            rec("06:30", "D16", "BR178"),
            rec("16:59", "D11", "BR100"),
            rec("17:00", "D12", "BR200"),
            rec("23:55:00", "D12", "BR300"),
            rec("TBD", "D12", "BR400"),
        ]);
        assert_eq!(summary.total_flights, 5);
        assert_eq!(summary.before_cutoff, 2);
        assert_eq!(summary.after_cutoff, 2);
    }

    #[test]
    fn summary_uses_persisted_key_names() {
        let summary: Summary =
            serde_json::from_value(json!({"total_flights": 3, "before_17:00": 2, "after_17:00": 1}))
                .expect("summary");
        assert_eq!(
            summary,
            Summary {
                total_flights: 3,
                before_cutoff: 2,
                after_cutoff: 1
            }
        );
        let missing: Summary = serde_json::from_value(json!({})).expect("defaults");
        assert_eq!(missing, Summary::default());
    }

    #[test]
    fn parse_skips_bad_records_with_warnings() {
        let text = json!({
            "date": "2026-02-01",
            "flights": [
                {"time": "06:30", "gate": "D16", "flight_code": "BR178"},
                "not a record",
                {"time": "07:00", "gate": {"nested": true}},
                {"time": "08:00", "gate": "D12", "flight_code": "CI7"},
            ],
            "summary": {"total_flights": 2, "before_17:00": 2, "after_17:00": 0},
            "updated_at": "2026-02-01T05:00:00",
        })
        .to_string();

        let snapshot = Snapshot::parse(&text).expect("parsed");
        assert_eq!(snapshot.flights.len(), 2);
        assert_eq!(snapshot.warnings.len(), 2);
        assert_eq!(snapshot.warnings[0].index, 1);
        assert_eq!(snapshot.warnings[1].index, 2);
    }

    #[test]
    fn parse_consolidates_unmerged_rows() {
        let text = json!({
            "date": "2026-02-01",
            "flights": [
                {"time": "06:30", "gate": "D16", "flight_code": "BR178"},
                {"time": "06:30", "gate": "D16", "flight_code": "NH5803"},
            ],
        })
        .to_string();
        let snapshot = Snapshot::parse(&text).expect("parsed");
        assert_eq!(snapshot.flights.len(), 1);
        assert_eq!(snapshot.flights[0].codeshare_flights[0].flight_code, "NH5803");
    }

    #[test]
    fn parse_rejects_malformed_documents() {
        assert!(matches!(Snapshot::parse("{not json"), Err(SnapshotParseError::Json(_))));
        assert!(matches!(Snapshot::parse("[]"), Err(SnapshotParseError::NotAnObject)));
        assert!(matches!(
            Snapshot::parse(r#"{"flights": "nope"}"#),
            Err(SnapshotParseError::Json(_))
        ));
    }

    #[test]
    fn build_sorts_and_formats() {
        let mut late = rec("18:00", "D12", "BR200");
        late.airline_name = "長榮航空".into();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 4, 0, 0).single().expect("ts");
        let snapshot = Snapshot::build("2026-02-01", vec![late, rec("06:30", "D16", "BR178")], at);

        assert_eq!(snapshot.flights[0].flight_code, "BR178");
        assert_eq!(
            snapshot.formatted_display,
            vec!["06:30 : D16 : BR178 (BR)", "18:00 : D12 : BR200 (長榮航空)"]
        );
        assert_eq!(snapshot.summary.before_cutoff, 1);
        assert_eq!(snapshot.summary.after_cutoff, 1);
        assert_eq!(snapshot.updated_at.as_deref(), Some("2026-02-01T04:00:00+00:00"));
    }

    #[test]
    fn persisted_form_parses_back_to_same_flights() {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 4, 0, 0).single().expect("ts");
        let snapshot = Snapshot::build("2026-02-01", vec![rec("06:30", "D16", "BR178")], at);
        let bytes = snapshot.to_json_pretty().expect("serialize");
        let parsed = Snapshot::parse(std::str::from_utf8(&bytes).expect("utf8")).expect("parse");
        assert_eq!(parsed, snapshot);
    }
}
