//! Identity data models produced by the extraction pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ErrorCategory, ScanError};

/// A plausibility-checked birth date.
///
/// Bounds are checked by the birth-date extractor against the configured
/// year range; day is only checked against `1..=31`, whatever the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTriple {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

impl DateTriple {
    pub fn new(day: u8, month: u8, year: u16) -> Self {
        Self { day, month, year }
    }

    /// The date as a real calendar date, if it is one.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)
    }

    /// Whether the triple names a day that exists (e.g. not 31/04).
    pub fn is_calendar_date(&self) -> bool {
        self.to_naive_date().is_some()
    }
}

impl fmt::Display for DateTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}/{:04}", self.day, self.month, self.year)
    }
}

impl FromStr for DateTriple {
    type Err = String;

    /// Parse the canonical `DD/MM/YYYY` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.len() != 3 {
            return Err(format!("expected DD/MM/YYYY, got {:?}", s));
        }

        let day = parts[0].parse().map_err(|_| format!("invalid day in {:?}", s))?;
        let month = parts[1].parse().map_err(|_| format!("invalid month in {:?}", s))?;
        let year = parts[2].parse().map_err(|_| format!("invalid year in {:?}", s))?;

        Ok(Self::new(day, month, year))
    }
}

impl Serialize for DateTriple {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateTriple {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fields whose absence fails the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MandatoryField {
    IdNumber,
    BirthDate,
}

impl MandatoryField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MandatoryField::IdNumber => "id_number",
            MandatoryField::BirthDate => "birth_date",
        }
    }
}

impl fmt::Display for MandatoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw output of the three field extractors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub id_number: Option<String>,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub birth_date: Option<DateTriple>,
}

impl ExtractedFields {
    /// Mandatory fields that are absent, in declaration order.
    pub fn missing_mandatory(&self) -> Vec<MandatoryField> {
        let mut missing = Vec::new();
        if self.id_number.is_none() {
            missing.push(MandatoryField::IdNumber);
        }
        if self.birth_date.is_none() {
            missing.push(MandatoryField::BirthDate);
        }
        missing
    }

    /// Human-readable notes about optional or suspicious fields.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.surname.is_none() {
            warnings.push("surname not found".to_string());
        }
        if self.given_name.is_none() {
            warnings.push("given name not found".to_string());
        }
        if let Some(date) = self.birth_date {
            if !date.is_calendar_date() {
                warnings.push(format!("birth date {} is not a calendar date", date));
            }
        }

        warnings
    }
}

/// Successful extraction: mandatory fields are guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub success: bool,
    pub id_number: String,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub birth_date: DateTriple,
    /// Text recognized on the unprocessed image.
    pub raw_text: String,
    /// Text recognized on the enhanced image.
    pub processed_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Structured failure handed back to callers instead of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub success: bool,
    pub error: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_fields: Vec<MandatoryField>,
}

impl From<&ScanError> for FailureRecord {
    fn from(err: &ScanError) -> Self {
        Self {
            success: false,
            error: err.category(),
            message: err.to_string(),
            missing_fields: err.missing_fields().to_vec(),
        }
    }
}

/// Either outcome of one pipeline run, as serialized at the output boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Success(IdentityRecord),
    Failure(FailureRecord),
}

impl ExtractionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success(_))
    }
}

impl From<Result<IdentityRecord, ScanError>> for ExtractionOutcome {
    fn from(result: Result<IdentityRecord, ScanError>) -> Self {
        match result {
            Ok(record) => ExtractionOutcome::Success(record),
            Err(err) => ExtractionOutcome::Failure(FailureRecord::from(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_date_triple_display_is_zero_padded() {
        assert_eq!(DateTriple::new(5, 3, 1990).to_string(), "05/03/1990");
        assert_eq!(DateTriple::new(31, 12, 2001).to_string(), "31/12/2001");
    }

    #[test]
    fn test_date_triple_serde() {
        let date = DateTriple::new(7, 11, 1985);
        let json = serde_json::to_string(&date).unwrap();
        assert_eq!(json, "\"07/11/1985\"");

        let back: DateTriple = serde_json::from_str(&json).unwrap();
        assert_eq!(back, date);
        assert!(serde_json::from_str::<DateTriple>("\"1985-11-07\"").is_err());
    }

    #[test]
    fn test_calendar_check() {
        assert!(DateTriple::new(29, 2, 2000).is_calendar_date());
        assert!(!DateTriple::new(31, 4, 1990).is_calendar_date());
    }

    #[test]
    fn test_missing_mandatory() {
        let fields = ExtractedFields {
            id_number: Some("AB123456".to_string()),
            ..Default::default()
        };
        assert_eq!(fields.missing_mandatory(), vec![MandatoryField::BirthDate]);
        assert_eq!(
            ExtractedFields::default().missing_mandatory(),
            vec![MandatoryField::IdNumber, MandatoryField::BirthDate]
        );
    }

    #[test]
    fn test_warnings() {
        let fields = ExtractedFields {
            id_number: Some("AB123456".to_string()),
            surname: Some("Marie".to_string()),
            given_name: None,
            birth_date: Some(DateTriple::new(31, 6, 1990)),
        };
        assert_eq!(
            fields.warnings(),
            vec![
                "given name not found".to_string(),
                "birth date 31/06/1990 is not a calendar date".to_string(),
            ]
        );
    }

    #[test]
    fn test_failure_record_json() {
        let err = ScanError::from(ExtractionError::MissingFields(vec![MandatoryField::BirthDate]));
        let outcome = ExtractionOutcome::from(Err(err));
        assert!(!outcome.is_success());

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "ExtractionFailure");
        assert_eq!(json["missing_fields"][0], "birth_date");
    }
}
