//! Codeshare consolidation: one record per physical departure.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::record::{CanonicalRecord, CodeshareFlight, RawFlightRecord};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub date: String,
    pub time: String,
    pub gate: String,
}

/// Consolidated departures in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ConsolidatedSchedule {
    slots: Vec<(SlotKey, CanonicalRecord)>,
    index: HashMap<SlotKey, usize>,
}

impl ConsolidatedSchedule {
    pub fn get(&self, key: &SlotKey) -> Option<&CanonicalRecord> {
        self.index.get(key).map(|&i| &self.slots[i].1)
    }

    pub fn into_records(self) -> Vec<CanonicalRecord> {
        self.slots.into_iter().map(|(_, r)| r).collect()
    }

    pub fn into_dates(self) -> BTreeMap<String, Vec<CanonicalRecord>> {
        let mut by_date: BTreeMap<String, Vec<CanonicalRecord>> = BTreeMap::new();
        for (key, record) in self.slots {
            by_date.entry(key.date).or_default().push(record);
        }
        by_date
    }

    fn absorb(&mut self, key: SlotKey, record: CanonicalRecord) {
        let existing = self.index.get(&key).copied();
        match existing {
            Some(i) => merge_codeshare(&mut self.slots[i].1, record),
            None => {
                let mut primary = record;
                let own_code = primary.flight_code.clone();
                let listed = std::mem::take(&mut primary.codeshare_flights);
                for codeshare in listed {
                    push_codeshare(&mut primary, &own_code, codeshare);
                }
                self.index.insert(key.clone(), self.slots.len());
                self.slots.push((key, primary));
            }
        }
    }
}

/// The first row seen for a `(date, time, gate)` slot is the primary; later
/// rows become its codeshares.
pub fn consolidate<'a, I>(rows: I, fallback_date: &str) -> ConsolidatedSchedule
where
    I: IntoIterator<Item = &'a RawFlightRecord>,
{
    let mut schedule = ConsolidatedSchedule::default();
    for row in rows {
        let record = CanonicalRecord::from_raw(row);
        let key = SlotKey {
            date: row_date(row, fallback_date),
            time: record.time.clone(),
            gate: record.gate.clone(),
        };
        schedule.absorb(key, record);
    }
    for (_, record) in &mut schedule.slots {
        record.codeshare_flights.sort();
    }
    schedule
}

/// `date`, else the date part of `datetime`, else the fallback. Only
/// `YYYY-MM-DD` candidates are accepted.
pub fn row_date(row: &RawFlightRecord, fallback_date: &str) -> String {
    let explicit = row.date.as_deref().map(str::trim);
    let from_datetime = row.datetime.as_deref().map(str::trim).and_then(|dt| dt.get(..10));
    explicit
        .into_iter()
        .chain(from_datetime)
        .find(|candidate| is_calendar_date(candidate))
        .unwrap_or_else(|| fallback_date.trim())
        .to_string()
}

fn is_calendar_date(candidate: &str) -> bool {
    candidate.len() == 10 && NaiveDate::parse_from_str(candidate, "%Y-%m-%d").is_ok()
}

fn merge_codeshare(primary: &mut CanonicalRecord, other: CanonicalRecord) {
    let own_code = primary.flight_code.clone();
    let CanonicalRecord {
        flight_code,
        airline_code,
        airline_name,
        codeshare_flights,
        ..
    } = other;

    push_codeshare(
        primary,
        &own_code,
        CodeshareFlight {
            flight_code,
            airline_code,
            airline_name,
        },
    );
    for codeshare in codeshare_flights {
        push_codeshare(primary, &own_code, codeshare);
    }
}

fn push_codeshare(primary: &mut CanonicalRecord, own_code: &str, codeshare: CodeshareFlight) {
    if codeshare.flight_code.is_empty() || codeshare.flight_code == own_code {
        return;
    }
    if primary
        .codeshare_flights
        .iter()
        .any(|c| c.flight_code == codeshare.flight_code)
    {
        return;
    }
    primary.codeshare_flights.push(codeshare);
}
