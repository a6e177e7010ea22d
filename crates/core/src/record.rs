//! Record schema: the raw tabular row, its anomaly annotation, and the two
//! validation outcomes.
//!
//! A [`TabularRow`] keeps every cell as read so that nothing is lost before the
//! scorer imputes and the validator decides. A [`ValidatedRecord`] carries typed
//! fields only; an [`InvalidRecord`] carries the original row plus the reason.

use chrono::NaiveDate;
use emr_types::{DiagnosisCode, EmailAddress, Gender, NonEmptyText};
use serde::{Deserialize, Serialize};

/// The three numeric vital-sign columns used by the anomaly scorer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VitalSign {
    HeartRate,
    Systolic,
    Diastolic,
}

impl VitalSign {
    pub const ALL: [VitalSign; 3] = [VitalSign::HeartRate, VitalSign::Systolic, VitalSign::Diastolic];

    /// Column name in the input dataset.
    pub fn column(self) -> &'static str {
        match self {
            VitalSign::HeartRate => "heart_rate",
            VitalSign::Systolic => "blood_pressure_systolic",
            VitalSign::Diastolic => "blood_pressure_diastolic",
        }
    }
}

/// One subject's raw EMR data as read from the input dataset.
///
/// Cells are kept as text. Blank `notes` is `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TabularRow {
    pub patient_id: String,
    pub name: String,
    pub dob: String,
    pub gender: String,
    pub email: String,
    pub diagnosis_code: String,
    pub heart_rate: String,
    pub blood_pressure_systolic: String,
    pub blood_pressure_diastolic: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TabularRow {
    /// Raw cell for a vital sign.
    pub fn vital_text(&self, vital: VitalSign) -> &str {
        match vital {
            VitalSign::HeartRate => &self.heart_rate,
            VitalSign::Systolic => &self.blood_pressure_systolic,
            VitalSign::Diastolic => &self.blood_pressure_diastolic,
        }
    }

    /// Numeric value of a vital sign, or `None` when blank, non-numeric or non-finite.
    pub fn vital(&self, vital: VitalSign) -> Option<f64> {
        self.vital_text(vital)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// Notes text when present and not blank.
    pub fn note(&self) -> Option<&str> {
        self.notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Binary outlier classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyStatus {
    Normal,
    Anomaly,
}

impl AnomalyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AnomalyStatus::Normal => "normal",
            AnomalyStatus::Anomaly => "anomaly",
        }
    }
}

/// Per-row outlier signal.
///
/// Scores are only comparable within one batch. Lower is more anomalous; a
/// negative score means the row was classified as an anomaly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnomalyAnnotation {
    pub score: f64,
    pub status: AnomalyStatus,
}

/// A row that satisfied every field constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRecord {
    pub patient_id: NonEmptyText,
    pub name: NonEmptyText,
    pub dob: NaiveDate,
    pub gender: Gender,
    pub email: EmailAddress,
    pub diagnosis_code: DiagnosisCode,
    pub heart_rate: i64,
    pub blood_pressure_systolic: i64,
    pub blood_pressure_diastolic: i64,
    pub notes: Option<String>,
    pub anomaly: AnomalyAnnotation,
}

/// A row that violated at least one field constraint.
#[derive(Clone, Debug, PartialEq)]
pub struct InvalidRecord {
    pub row: TabularRow,
    pub anomaly: AnomalyAnnotation,
    /// Human-readable description naming each offending field.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vital_parses_numbers_and_rejects_junk() {
        let row = TabularRow {
            heart_rate: " 72 ".into(),
            blood_pressure_systolic: "abc".into(),
            blood_pressure_diastolic: "NaN".into(),
            ..TabularRow::default()
        };
        assert_eq!(row.vital(VitalSign::HeartRate), Some(72.0));
        assert_eq!(row.vital(VitalSign::Systolic), None);
        assert_eq!(row.vital(VitalSign::Diastolic), None);
    }

    #[test]
    fn blank_note_is_absent() {
        let mut row = TabularRow {
            notes: Some("   ".into()),
            ..TabularRow::default()
        };
        assert_eq!(row.note(), None);
        row.notes = Some(" persistent cough ".into());
        assert_eq!(row.note(), Some("persistent cough"));
    }

    #[test]
    fn anomaly_status_serialises_lowercase() {
        assert_eq!(
            serde_json::to_string(&AnomalyStatus::Anomaly).unwrap(),
            "\"anomaly\""
        );
        assert_eq!(AnomalyStatus::Normal.as_str(), "normal");
    }
}
