//! Raw scraper rows and their canonical, comparable form.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

/// Field order matters: the derived `Ord` sorts by `flight_code` first, which is
/// what makes codeshare lists order-independent once canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct CodeshareFlight {
    pub flight_code: String,
    pub airline_code: String,
    pub airline_name: String,
}

#[derive(Debug, Error)]
pub enum RecordParseError {
    #[error("flight record is not an object (found {0})")]
    NotAnObject(&'static str),
    #[error("flight record has an invalid field: {0}")]
    InvalidField(#[from] serde_json::Error),
}

/// Scalars of any JSON type are accepted for text fields; objects and arrays are
/// rejected with [`RecordParseError`]. Unknown keys (`terminal`, `updated_at`, ...)
/// are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawFlightRecord {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub gate: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub flight_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub airline_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub airline_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub airport_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub aircraft: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub aircraft_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codeshare_flights: Option<JsonValue>,
}

impl RawFlightRecord {
    pub fn from_value(value: &JsonValue) -> Result<Self, RecordParseError> {
        if !value.is_object() {
            return Err(RecordParseError::NotAnObject(json_kind(value)));
        }
        Ok(serde_json::from_value(value.clone())?)
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(JsonValue::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a scalar value, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub time: String,
    pub gate: String,
    pub flight_code: String,
    pub airline_code: String,
    pub airline_name: String,
    pub destination: String,
    pub status: String,
    pub aircraft: String,
    pub codeshare_flights: Vec<CodeshareFlight>,
}

impl CanonicalRecord {
    /// Record Normalizer. Pure and idempotent through [`RawFlightRecord::from`].
    pub fn from_raw(raw: &RawFlightRecord) -> Self {
        let mut codeshare_flights = canonical_codeshares(raw.codeshare_flights.as_ref());
        codeshare_flights.sort();

        Self {
            time: trimmed(&raw.time),
            gate: trimmed(&raw.gate),
            flight_code: trimmed(&raw.flight_code),
            airline_code: trimmed(&raw.airline_code),
            airline_name: trimmed(&raw.airline_name),
            destination: destination_of(raw),
            status: trimmed(&raw.status),
            aircraft: first_non_blank(&[&raw.aircraft, &raw.aircraft_type]),
            codeshare_flights,
        }
    }

    pub fn shares_code(&self, flight_code: &str) -> bool {
        self.flight_code == flight_code
            || self
                .codeshare_flights
                .iter()
                .any(|c| c.flight_code == flight_code)
    }

    pub fn airline_display(&self) -> &str {
        if self.airline_name.is_empty() {
            &self.airline_code
        } else {
            &self.airline_name
        }
    }
}

impl From<&CanonicalRecord> for RawFlightRecord {
    fn from(record: &CanonicalRecord) -> Self {
        let codeshares = record
            .codeshare_flights
            .iter()
            .map(|c| {
                let mut obj = JsonMap::new();
                obj.insert("flight_code".into(), JsonValue::String(c.flight_code.clone()));
                obj.insert("airline_code".into(), JsonValue::String(c.airline_code.clone()));
                obj.insert("airline_name".into(), JsonValue::String(c.airline_name.clone()));
                JsonValue::Object(obj)
            })
            .collect();

        Self {
            time: Some(record.time.clone()),
            gate: Some(record.gate.clone()),
            flight_code: Some(record.flight_code.clone()),
            airline_code: Some(record.airline_code.clone()),
            airline_name: Some(record.airline_name.clone()),
            destination: Some(record.destination.clone()),
            status: Some(record.status.clone()),
            aircraft: Some(record.aircraft.clone()),
            codeshare_flights: Some(JsonValue::Array(codeshares)),
            ..Default::default()
        }
    }
}

fn trimmed(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn first_non_blank(candidates: &[&Option<String>]) -> String {
    candidates
        .iter()
        .map(|c| trimmed(c))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn destination_of(raw: &RawFlightRecord) -> String {
    let explicit = trimmed(&raw.destination);
    if !explicit.is_empty() {
        return explicit;
    }
    let city = trimmed(&raw.city);
    let airport = trimmed(&raw.airport_code);
    match (city.is_empty(), airport.is_empty()) {
        (false, false) => format!("{city} ({airport})"),
        (false, true) => city,
        (true, false) => airport,
        (true, true) => String::new(),
    }
}

fn canonical_codeshares(value: Option<&JsonValue>) -> Vec<CodeshareFlight> {
    let Some(JsonValue::Array(items)) = value else {
        return Vec::new();
    };
    items.iter().map(codeshare_from_value).collect()
}

// Non-object entries keep their string form as the flight code so they still
// take part in ordering and equality.
fn codeshare_from_value(item: &JsonValue) -> CodeshareFlight {
    match item {
        JsonValue::Object(obj) => CodeshareFlight {
            flight_code: scalar_text(obj.get("flight_code")),
            airline_code: scalar_text(obj.get("airline_code")),
            airline_name: scalar_text(obj.get("airline_name")),
        },
        other => CodeshareFlight {
            flight_code: scalar_text(Some(other)),
            ..Default::default()
        },
    }
}

fn scalar_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw(value: JsonValue) -> RawFlightRecord {
        RawFlightRecord::from_value(&value).expect("valid raw record")
    }

    #[test]
    fn trims_and_defaults_missing_fields() {
        let record = CanonicalRecord::from_raw(&raw(json!({
            "time": " 06:30 ",
            "gate": "D16\n",
            "flight_code": "BR178",
            "status": "準時ON TIME  ",
        })));
        assert_eq!(record.time, "06:30");
        assert_eq!(record.gate, "D16");
        assert_eq!(record.status, "準時ON TIME");
        assert_eq!(record.airline_name, "");
        assert_eq!(record.aircraft, "");
        assert!(record.codeshare_flights.is_empty());
    }

    #[test]
    fn prefers_aircraft_over_legacy_aircraft_type() {
        let both = CanonicalRecord::from_raw(&raw(json!({
            "aircraft": "B787-10",
            "aircraft_type": "A321",
        })));
        assert_eq!(both.aircraft, "B787-10");

        let legacy_only = CanonicalRecord::from_raw(&raw(json!({ "aircraft_type": "A321" })));
        assert_eq!(legacy_only.aircraft, "A321");

        let blank_new = CanonicalRecord::from_raw(&raw(json!({
            "aircraft": "  ",
            "aircraft_type": "A321",
        })));
        assert_eq!(blank_new.aircraft, "A321");
    }

    #[test]
    fn stringifies_scalar_fields() {
        let record = CanonicalRecord::from_raw(&raw(json!({
            "gate": 16,
            "flight_code": "BR178",
            "status": true,
        })));
        assert_eq!(record.gate, "16");
        assert_eq!(record.status, "true");
    }

    #[test]
    fn derives_destination_from_city_and_airport() {
        let record = CanonicalRecord::from_raw(&raw(json!({
            "city": "Osaka Kansai",
            "airport_code": "KIX",
        })));
        assert_eq!(record.destination, "Osaka Kansai (KIX)");

        let explicit = CanonicalRecord::from_raw(&raw(json!({
            "destination": "大阪 (KIX)",
            "city": "Osaka Kansai",
            "airport_code": "KIX",
        })));
        assert_eq!(explicit.destination, "大阪 (KIX)");
    }

    #[test]
    fn sorts_codeshares_by_flight_code() {
        let record = CanonicalRecord::from_raw(&raw(json!({
            "flight_code": "BR178",
            "codeshare_flights": [
                {"flight_code": "TG6354", "airline_code": "TG", "airline_name": "泰國航空"},
                {"flight_code": "NH5803", "airline_code": "NH", "airline_name": "全日空"},
                "AA1234",
            ],
        })));
        let codes: Vec<_> = record
            .codeshare_flights
            .iter()
            .map(|c| c.flight_code.as_str())
            .collect();
        assert_eq!(codes, vec!["AA1234", "NH5803", "TG6354"]);
    }

    #[test]
    fn non_list_codeshares_are_empty() {
        let record = CanonicalRecord::from_raw(&raw(json!({
            "codeshare_flights": {"flight_code": "TG6354"},
        })));
        assert!(record.codeshare_flights.is_empty());
    }

    #[test]
    fn rejects_non_object_and_nested_fields() {
        assert!(matches!(
            RawFlightRecord::from_value(&json!("BR178")),
            Err(RecordParseError::NotAnObject("string"))
        ));
        assert!(matches!(
            RawFlightRecord::from_value(&json!({"gate": ["D16"]})),
            Err(RecordParseError::InvalidField(_))
        ));
    }

    #[test]
    fn ignores_volatile_fields() {
        let a = CanonicalRecord::from_raw(&raw(json!({
            "flight_code": "BR178",
            "updated_at": "2026-02-01T10:00:00",
        })));
        let b = CanonicalRecord::from_raw(&raw(json!({
            "flight_code": "BR178",
            "updated_at": "2026-02-01T11:00:00",
        })));
        assert_eq!(a, b);
    }

    fn scalar_strategy() -> impl Strategy<Value = JsonValue> {
        prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::Bool),
            any::<i32>().prop_map(|n| JsonValue::Number(n.into())),
            "[ A-Z0-9:()]{0,12}".prop_map(JsonValue::String),
        ]
    }

    fn codeshare_strategy() -> impl Strategy<Value = JsonValue> {
        prop_oneof![
            scalar_strategy(),
            (scalar_strategy(), scalar_strategy(), scalar_strategy()).prop_map(|(f, c, n)| {
                json!({"flight_code": f, "airline_code": c, "airline_name": n})
            }),
        ]
    }

    fn raw_strategy() -> impl Strategy<Value = JsonValue> {
        (
            proptest::collection::vec(scalar_strategy(), 11),
            prop_oneof![
                Just(JsonValue::Null),
                proptest::collection::vec(codeshare_strategy(), 0..4).prop_map(JsonValue::Array),
            ],
        )
            .prop_map(|(s, codeshares)| {
                json!({
                    "time": s[0], "gate": s[1], "flight_code": s[2],
                    "airline_code": s[3], "airline_name": s[4], "destination": s[5],
                    "city": s[6], "airport_code": s[7], "status": s[8],
                    "aircraft": s[9], "aircraft_type": s[10],
                    "codeshare_flights": codeshares,
                })
            })
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(value in raw_strategy()) {
            let once = CanonicalRecord::from_raw(&raw(value));
            let twice = CanonicalRecord::from_raw(&RawFlightRecord::from(&once));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn codeshare_order_does_not_matter(
            items in proptest::collection::vec(codeshare_strategy(), 0..5)
        ) {
            let mut reversed = items.clone();
            reversed.reverse();
            let a = CanonicalRecord::from_raw(&raw(json!({"codeshare_flights": items})));
            let b = CanonicalRecord::from_raw(&raw(json!({"codeshare_flights": reversed})));
            prop_assert_eq!(a, b);
        }
    }
}
