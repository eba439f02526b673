//! Raw openFDA record → canonical [`Report`].
//!
//! This is the only place that reaches into the loosely typed raw document.
//! Nothing here fails: every missing or malformed field degrades to `None`,
//! an empty list, or the `"Unknown"` sentinel.

use crate::common::constants::{OPENFDA_SOURCE, UNKNOWN_SENTINEL};
use crate::common::types::RawRecord;
use crate::domain::{Drug, Patient, Reaction, Report, Sex};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Converts raw search results into canonical reports
pub struct ReportNormalizer {
    source: String,
    clock: fn() -> DateTime<Utc>,
}

impl Default for ReportNormalizer {
    fn default() -> Self {
        Self::new(OPENFDA_SOURCE)
    }
}

impl ReportNormalizer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used for `processed_at`
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn normalize(&self, raw: &RawRecord) -> Report {
        let patient = raw.get("patient").and_then(Value::as_object);

        Report {
            report_id: raw.get("safetyreportid").and_then(text_of).unwrap_or_default(),
            received_date: raw.get("receivedate").and_then(parse_compact_date),
            patient: patient.map(normalize_patient).unwrap_or_default(),
            drugs: objects(patient, "drug").map(normalize_drug).collect(),
            reactions: objects(patient, "reaction").map(normalize_reaction).collect(),
            source: self.source.clone(),
            processed_at: (self.clock)(),
        }
    }
}

fn normalize_patient(patient: &RawRecord) -> Patient {
    Patient {
        age: patient.get("patientonsetage").and_then(parse_age),
        age_unit: patient
            .get("patientonsetageunit")
            .and_then(text_of)
            .map(|unit| unit.trim().to_lowercase())
            .filter(|unit| !unit.is_empty()),
        sex: Sex::from_code(patient.get("patientsex").and_then(text_of).as_deref()),
        weight: patient.get("patientweight").and_then(parse_float),
    }
}

fn normalize_drug(drug: &RawRecord) -> Drug {
    let active_ingredients = drug
        .get("openfda")
        .and_then(|o| o.get("substance_name"))
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Drug {
        name: trimmed_or_sentinel(drug.get("medicinalproduct")),
        active_ingredients,
        dosage_form: trimmed_non_empty(drug.get("drugdosageform")),
        start_date: drug.get("drugstartdate").and_then(parse_compact_date),
        end_date: drug.get("drugenddate").and_then(parse_compact_date),
    }
}

fn normalize_reaction(reaction: &RawRecord) -> Reaction {
    Reaction {
        term: trimmed_or_sentinel(reaction.get("reactionmeddrapt")),
        outcome: trimmed_non_empty(reaction.get("reactionoutcome")),
    }
}

/// Object entries of `parent[key]`, in source order. Non-objects are skipped.
fn objects<'a>(parent: Option<&'a RawRecord>, key: &str) -> impl Iterator<Item = &'a RawRecord> {
    parent
        .and_then(|p| p.get(key))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Strings as-is, numbers rendered in decimal; anything else has no text
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn trimmed_non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(text_of)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn trimmed_or_sentinel(value: Option<&Value>) -> String {
    trimmed_non_empty(value).unwrap_or_else(|| UNKNOWN_SENTINEL.to_string())
}

/// `YYYYMMDD...` → `YYYY-MM-DDT00:00:00`.
///
/// Only the first eight characters are read, untrimmed. Shorter, padded,
/// non-numeric or impossible dates give `None`, never a partial date.
pub fn parse_compact_date(value: &Value) -> Option<String> {
    let head: String = value.as_str()?.chars().take(8).collect();
    if head.len() != 8 || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let year: i32 = head[0..4].parse().ok()?;
    let month: u32 = head[4..6].parse().ok()?;
    let day: u32 = head[6..8].parse().ok()?;
    if year < 1 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%dT00:00:00").to_string())
}

/// Integer or numeric string, fractional part truncated
pub fn parse_age(value: &Value) -> Option<i64> {
    let age = parse_float(value)?.trunc();
    if age < i64::MIN as f64 || age > i64::MAX as f64 {
        return None;
    }
    Some(age as i64)
}

fn parse_float(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}
