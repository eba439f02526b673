use crate::common::error::{EtlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical adverse event report, the unit of persistence.
///
/// Built once by the normalizer and never mutated afterwards. Date fields are
/// either full ISO-8601 strings (`YYYY-MM-DDTHH:MM:SS`) or `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub received_date: Option<String>,
    pub patient: Patient,
    pub drugs: Vec<Drug>,
    pub reactions: Vec<Reaction>,
    pub source: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub age: Option<i64>,
    pub age_unit: Option<String>,
    pub sex: Sex,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub name: String,
    pub active_ingredients: Vec<String>,
    pub dosage_form: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub term: String,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

impl Sex {
    /// Map the coded `patientsex` value; anything but exactly "1" or "2" is Unknown
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("1") => Sex::Male,
            Some("2") => Sex::Female,
            _ => Sex::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
            Sex::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Report {
    /// Structural check applied by every sink before a write
    pub fn validate(&self) -> Result<()> {
        if self.report_id.trim().is_empty() {
            return Err(EtlError::MalformedRecord(
                "report has no report_id".to_string(),
            ));
        }
        Ok(())
    }

    /// The identity key, if the raw record carried one
    pub fn known_id(&self) -> Option<&str> {
        let id = self.report_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sex_code_mapping_is_total() {
        assert_eq!(Sex::from_code(Some("1")), Sex::Male);
        assert_eq!(Sex::from_code(Some("2")), Sex::Female);
        assert_eq!(Sex::from_code(Some("9")), Sex::Unknown);
        assert_eq!(Sex::from_code(None), Sex::Unknown);
        assert_eq!(Sex::from_code(Some(" 1")), Sex::Unknown);
        assert_eq!(Sex::from_code(Some("2 ")), Sex::Unknown);
        assert_eq!(Sex::Female.to_string(), "Female");
    }

    #[test]
    fn sex_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Sex::Male).unwrap(), "\"Male\"");
    }

    #[test]
    fn report_without_id_fails_validation() {
        let report = Report {
            report_id: "  ".to_string(),
            received_date: None,
            patient: Patient::default(),
            drugs: vec![],
            reactions: vec![],
            source: "openfda".to_string(),
            processed_at: Utc::now(),
        };
        assert!(matches!(report.validate(), Err(EtlError::MalformedRecord(_))));
        assert_eq!(report.known_id(), None);
    }
}
