//! Row validation.
//!
//! Every row is classified exactly once: it either becomes a [`ValidatedRecord`] or
//! an [`InvalidRecord`] carrying the original cells and a description of every
//! violated field constraint. Violations are routine outcomes, not errors; they
//! never abort the batch.
//!
//! Constraints:
//! - `patient_id`, `name`: required, non-blank
//! - `dob`: a calendar date, `YYYY-MM-DD`
//! - `gender`: exactly `Male`, `Female` or `Other`
//! - `email`: a syntactically valid address
//! - `diagnosis_code`: one uppercase ASCII letter followed by two digits
//! - `heart_rate`: an integer in `[30, 200]`
//! - `blood_pressure_systolic`, `blood_pressure_diastolic`: integers
//!
//! The anomaly annotation is carried through unchecked: an anomalous row can be
//! valid and a normal row can be invalid.

use crate::constants::{HEART_RATE_MAX, HEART_RATE_MIN};
use crate::record::{AnomalyAnnotation, AnomalyStatus, InvalidRecord, TabularRow, ValidatedRecord};
use crate::{PipelineError, PipelineResult};
use chrono::NaiveDate;
use emr_types::{DiagnosisCode, EmailAddress, Gender, NonEmptyText};

/// One violated field constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldViolation {
    /// Input column name.
    pub field: &'static str,
    pub reason: String,
}

impl FieldViolation {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Render violations as the single `error` cell written to the invalid sink.
pub fn describe(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate one row.
///
/// Validity depends only on the row's own cells. All violations are reported, in
/// column order.
///
/// # Errors
///
/// Returns every [`FieldViolation`] found if any constraint fails.
pub fn validate_row(
    row: &TabularRow,
    anomaly: AnomalyAnnotation,
) -> Result<ValidatedRecord, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    let patient_id = required_text("patient_id", &row.patient_id, &mut violations);
    let name = required_text("name", &row.name, &mut violations);

    let dob = NaiveDate::parse_from_str(row.dob.trim(), "%Y-%m-%d")
        .map_err(|e| {
            violations.push(FieldViolation::new(
                "dob",
                format!("'{}' is not a valid calendar date (YYYY-MM-DD): {e}", row.dob),
            ))
        })
        .ok();

    let gender = Gender::parse(&row.gender)
        .map_err(|e| violations.push(FieldViolation::new("gender", e.to_string())))
        .ok();

    let email = EmailAddress::parse(row.email.trim())
        .map_err(|e| violations.push(FieldViolation::new("email", e.to_string())))
        .ok();

    let diagnosis_code = DiagnosisCode::parse(&row.diagnosis_code)
        .map_err(|e| violations.push(FieldViolation::new("diagnosis_code", e.to_string())))
        .ok();

    let heart_rate = required_integer("heart_rate", &row.heart_rate, &mut violations).filter(|hr| {
        let in_range = (HEART_RATE_MIN..=HEART_RATE_MAX).contains(hr);
        if !in_range {
            violations.push(FieldViolation::new(
                "heart_rate",
                format!("{hr} is out of range [{HEART_RATE_MIN}, {HEART_RATE_MAX}]"),
            ));
        }
        in_range
    });

    let systolic = required_integer(
        "blood_pressure_systolic",
        &row.blood_pressure_systolic,
        &mut violations,
    );
    let diastolic = required_integer(
        "blood_pressure_diastolic",
        &row.blood_pressure_diastolic,
        &mut violations,
    );

    match (
        patient_id,
        name,
        dob,
        gender,
        email,
        diagnosis_code,
        heart_rate,
        systolic,
        diastolic,
    ) {
        (
            Some(patient_id),
            Some(name),
            Some(dob),
            Some(gender),
            Some(email),
            Some(diagnosis_code),
            Some(heart_rate),
            Some(blood_pressure_systolic),
            Some(blood_pressure_diastolic),
        ) if violations.is_empty() => Ok(ValidatedRecord {
            patient_id,
            name,
            dob,
            gender,
            email,
            diagnosis_code,
            heart_rate,
            blood_pressure_systolic,
            blood_pressure_diastolic,
            notes: row.note().map(str::to_string),
            anomaly,
        }),
        _ => Err(violations),
    }
}

/// Field violations for a row, without building the typed record.
pub fn row_violations(row: &TabularRow) -> Vec<FieldViolation> {
    let placeholder = AnomalyAnnotation {
        score: 0.0,
        status: AnomalyStatus::Normal,
    };
    validate_row(row, placeholder).err().unwrap_or_default()
}

fn required_text(
    field: &'static str,
    value: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<NonEmptyText> {
    NonEmptyText::new(value)
        .map_err(|_| violations.push(FieldViolation::new(field, "field required")))
        .ok()
}

fn required_integer(
    field: &'static str,
    value: &str,
    violations: &mut Vec<FieldViolation>,
) -> Option<i64> {
    let parsed = parse_integer(value);
    if parsed.is_none() {
        violations.push(FieldViolation::new(
            field,
            format!("'{value}' is not an integer"),
        ));
    }
    parsed
}

/// Accepts plain integer text, optionally followed by a zero fraction (`72`, `72.0`).
/// Exponent forms such as `1e2` are rejected.
fn parse_integer(value: &str) -> Option<i64> {
    let value = value.trim();
    let whole = match value.split_once('.') {
        Some((whole, fraction)) if !fraction.is_empty() && fraction.bytes().all(|b| b == b'0') => {
            whole
        }
        Some(_) => return None,
        None => value,
    };
    whole.parse::<i64>().ok()
}

/// The two sinks produced by one validation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationOutcome {
    pub valid: Vec<ValidatedRecord>,
    pub invalid: Vec<InvalidRecord>,
}

impl ValidationOutcome {
    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }
}

/// Partition a batch into valid and invalid sinks.
///
/// `annotations[i]` must belong to `rows[i]`.
///
/// # Errors
///
/// Returns `PipelineError::InvalidInput` if the two slices differ in length.
pub fn partition(
    rows: &[TabularRow],
    annotations: &[AnomalyAnnotation],
) -> PipelineResult<ValidationOutcome> {
    if rows.len() != annotations.len() {
        return Err(PipelineError::InvalidInput(format!(
            "{} rows but {} anomaly annotations",
            rows.len(),
            annotations.len()
        )));
    }

    let mut outcome = ValidationOutcome::default();
    for (row, anomaly) in rows.iter().zip(annotations) {
        match validate_row(row, *anomaly) {
            Ok(record) => outcome.valid.push(record),
            Err(violations) => {
                let error = describe(&violations);
                tracing::debug!(patient_id = %row.patient_id, %error, "row failed validation");
                outcome.invalid.push(InvalidRecord {
                    row: row.clone(),
                    anomaly: *anomaly,
                    error,
                });
            }
        }
    }

    tracing::info!(
        total = outcome.total(),
        valid = outcome.valid.len(),
        invalid = outcome.invalid.len(),
        "validation pass complete"
    );

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_row() -> TabularRow {
        TabularRow {
            patient_id: "P-001".into(),
            name: "Ada Lovelace".into(),
            dob: "1990-01-01".into(),
            gender: "Male".into(),
            email: "ada@example.com".into(),
            diagnosis_code: "I10".into(),
            heart_rate: "72".into(),
            blood_pressure_systolic: "120".into(),
            blood_pressure_diastolic: "80".into(),
            notes: None,
        }
    }

    fn normal() -> AnomalyAnnotation {
        AnomalyAnnotation {
            score: 0.12,
            status: AnomalyStatus::Normal,
        }
    }

    fn violations_for(row: TabularRow) -> Vec<FieldViolation> {
        validate_row(&row, normal()).expect_err("row should be invalid")
    }

    #[test]
    fn accepts_valid_row_and_carries_annotation() {
        let record = validate_row(&valid_row(), normal()).expect("row should be valid");
        assert_eq!(record.patient_id.as_str(), "P-001");
        assert_eq!(record.gender, Gender::Male);
        assert_eq!(record.heart_rate, 72);
        assert_eq!(record.dob, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        assert_eq!(record.anomaly, normal());
    }

    #[test]
    fn anomalous_rows_can_still_be_valid() {
        let anomaly = AnomalyAnnotation {
            score: -0.2,
            status: AnomalyStatus::Anomaly,
        };
        let record = validate_row(&valid_row(), anomaly).expect("row should be valid");
        assert_eq!(record.anomaly.status, AnomalyStatus::Anomaly);
    }

    #[test]
    fn rejects_unknown_gender() {
        let violations = violations_for(TabularRow {
            gender: "Unknown".into(),
            ..valid_row()
        });
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "gender");
        assert!(describe(&violations).contains("gender"));
    }

    #[test]
    fn gender_match_is_case_sensitive() {
        let violations = violations_for(TabularRow {
            gender: "female".into(),
            ..valid_row()
        });
        assert_eq!(violations[0].field, "gender");
    }

    #[test]
    fn rejects_malformed_diagnosis_code() {
        let violations = violations_for(TabularRow {
            diagnosis_code: "Z9".into(),
            ..valid_row()
        });
        assert_eq!(violations[0].field, "diagnosis_code");
        assert!(violations[0].reason.contains("pattern"));
    }

    #[test]
    fn rejects_heart_rate_out_of_range() {
        let violations = violations_for(TabularRow {
            heart_rate: "250".into(),
            ..valid_row()
        });
        assert_eq!(violations[0].field, "heart_rate");
        assert!(violations[0].reason.contains("range"));
    }

    #[test]
    fn heart_rate_bounds_are_inclusive() {
        for hr in ["30", "200", "30.0"] {
            let row = TabularRow {
                heart_rate: hr.into(),
                ..valid_row()
            };
            assert!(validate_row(&row, normal()).is_ok(), "{hr} should be accepted");
        }
        for hr in ["29", "201", "72.5", "", "fast"] {
            let row = TabularRow {
                heart_rate: hr.into(),
                ..valid_row()
            };
            assert!(validate_row(&row, normal()).is_err(), "{hr} should be rejected");
        }
    }

    #[test]
    fn vitals_must_be_written_as_plain_integers() {
        for hr in ["72.00", "+72", " 72 "] {
            assert_eq!(parse_integer(hr), Some(72), "{hr} should be accepted");
        }
        for hr in ["1e2", "7.2e1", "72.", ".0", "72.01", "0x48"] {
            assert_eq!(parse_integer(hr), None, "{hr} should be rejected");
            let row = TabularRow {
                heart_rate: hr.into(),
                ..valid_row()
            };
            assert!(validate_row(&row, normal()).is_err(), "{hr} should be rejected");
        }
    }

    #[test]
    fn rejects_bad_email_and_date() {
        let violations = violations_for(TabularRow {
            email: "not-an-email".into(),
            dob: "1990-02-30".into(),
            ..valid_row()
        });
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["dob", "email"]);
    }

    #[test]
    fn reports_every_violation_in_column_order() {
        let violations = violations_for(TabularRow {
            patient_id: " ".into(),
            gender: "Unknown".into(),
            blood_pressure_diastolic: "eighty".into(),
            ..valid_row()
        });
        let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["patient_id", "gender", "blood_pressure_diastolic"]);
        assert_eq!(
            describe(&violations),
            "patient_id: field required; gender: 'Unknown' is not one of Male, Female, Other; blood_pressure_diastolic: 'eighty' is not an integer"
        );
    }

    #[test]
    fn partition_routes_every_row_exactly_once() {
        let rows = vec![
            valid_row(),
            TabularRow {
                patient_id: "P-002".into(),
                gender: "Unknown".into(),
                ..valid_row()
            },
            TabularRow {
                patient_id: "P-003".into(),
                heart_rate: "250".into(),
                ..valid_row()
            },
        ];
        let annotations = vec![normal(); rows.len()];

        let outcome = partition(&rows, &annotations).expect("partition");
        assert_eq!(outcome.total(), rows.len());
        assert_eq!(outcome.valid.len(), 1);
        assert_eq!(outcome.invalid.len(), 2);
        assert_eq!(outcome.invalid[0].row.patient_id, "P-002");
        assert!(outcome.invalid[1].error.contains("heart_rate"));

        for invalid in &outcome.invalid {
            assert!(outcome
                .valid
                .iter()
                .all(|v| v.patient_id.as_str() != invalid.row.patient_id));
        }
    }

    #[test]
    fn validity_does_not_depend_on_batch_order() {
        let rows = vec![
            TabularRow {
                patient_id: "P-009".into(),
                diagnosis_code: "i10".into(),
                ..valid_row()
            },
            valid_row(),
        ];
        let reversed: Vec<_> = rows.iter().rev().cloned().collect();
        let annotations = vec![normal(); 2];

        let forward = partition(&rows, &annotations).expect("partition");
        let backward = partition(&reversed, &annotations).expect("partition");
        assert_eq!(forward.valid, backward.valid);
        assert_eq!(forward.invalid, backward.invalid);
    }

    #[test]
    fn row_violations_is_empty_for_valid_rows() {
        assert!(row_violations(&valid_row()).is_empty());
        let bad = TabularRow {
            email: String::new(),
            ..valid_row()
        };
        assert_eq!(row_violations(&bad)[0].field, "email");
    }

    #[test]
    fn partition_rejects_misaligned_annotations() {
        let err = partition(&[valid_row()], &[]).expect_err("should reject");
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }
}
