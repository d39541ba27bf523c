//! Identity keys aligning baseline and fresh records.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::CanonicalRecord;

/// `TimeGate` treats every codeshare of one departure as the same entry, so a
/// codeshare appearing or disappearing shows up as a modification.
/// `TimeGateFlight` keeps the primary flight code in the key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScheme {
    #[default]
    TimeGate,
    TimeGateFlight,
}

impl KeyScheme {
    pub fn key_for(self, record: &CanonicalRecord) -> IdentityKey {
        IdentityKey {
            time: record.time.clone(),
            gate: record.gate.clone(),
            flight_code: match self {
                KeyScheme::TimeGate => None,
                KeyScheme::TimeGateFlight => Some(record.flight_code.clone()),
            },
        }
    }
}

impl std::str::FromStr for KeyScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "time_gate" => Ok(KeyScheme::TimeGate),
            "time_gate_flight" => Ok(KeyScheme::TimeGateFlight),
            other => Err(format!("unknown key scheme `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityKey {
    pub time: String,
    pub gate: String,
    pub flight_code: Option<String>,
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.flight_code {
            Some(code) => write!(f, "{}_{}_{}", self.time, self.gate, code),
            None => write!(f, "{}_{}", self.time, self.gate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKeyWarning {
    pub key: IdentityKey,
    pub kept_flight_code: String,
    pub discarded_flight_code: String,
    pub position: usize,
}

impl fmt::Display for DuplicateKeyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate key {} at position {}: kept {}, discarded {}",
            self.key, self.position, self.kept_flight_code, self.discarded_flight_code
        )
    }
}

/// Insertion-ordered key -> record map with first-wins collision handling.
#[derive(Debug, Clone, Default)]
pub struct KeyedRecords {
    entries: Vec<(IdentityKey, CanonicalRecord)>,
    index: HashMap<IdentityKey, usize>,
    warnings: Vec<DuplicateKeyWarning>,
}

impl KeyedRecords {
    pub fn build<I>(records: I, scheme: KeyScheme) -> Self
    where
        I: IntoIterator<Item = CanonicalRecord>,
    {
        let mut keyed = Self::default();
        for (position, record) in records.into_iter().enumerate() {
            let key = scheme.key_for(&record);
            if let Some(&existing) = keyed.index.get(&key) {
                keyed.warnings.push(DuplicateKeyWarning {
                    key,
                    kept_flight_code: keyed.entries[existing].1.flight_code.clone(),
                    discarded_flight_code: record.flight_code,
                    position,
                });
                continue;
            }
            keyed.index.insert(key.clone(), keyed.entries.len());
            keyed.entries.push((key, record));
        }
        keyed
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&CanonicalRecord> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &IdentityKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &CanonicalRecord)> {
        self.entries.iter().map(|(k, r)| (k, r))
    }

    pub fn warnings(&self) -> &[DuplicateKeyWarning] {
        &self.warnings
    }
}
