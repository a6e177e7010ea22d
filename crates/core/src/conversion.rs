//! Bundle conversion.
//!
//! Each subject row becomes a small cluster of cross-referenced resources, appended
//! to one collection bundle in row order:
//!
//! 1. a Patient (identity) resource
//! 2. zero or one Condition, when the extractor names a diagnosis in the notes
//! 3. a heart-rate Observation
//! 4. a blood-pressure panel Observation with systolic and diastolic components
//!
//! Resources are linked only through `Patient/<patient_id>` subject references.
//! Rows are not re-validated here; cells are carried over as read.

use crate::config::ObservationTimestamp;
use crate::constants::PATIENT_REFERENCE_KIND;
use crate::extractor::{should_extract, DiagnosisExtractor, Extraction};
use crate::record::{TabularRow, VitalSign};
use fhir::{
    BundleData, ClinicalStatus, Coding, ConditionData, ObservationComponent, ObservationData,
    ObservationStatus, PatientData, Quantity, Reference, Resource, BLOOD_PRESSURE_PANEL_CODE,
    BLOOD_PRESSURE_PANEL_DISPLAY, DIASTOLIC_CODE, DIASTOLIC_DISPLAY, EXTRACTED_DIAGNOSIS_SYSTEM,
    HEART_RATE_CODE, HEART_RATE_DISPLAY, HEART_RATE_UNIT, LOINC_SYSTEM, MMHG_UNIT, SYSTOLIC_CODE,
    SYSTOLIC_DISPLAY,
};
use uuid::Uuid;

/// Builds one bundle per pass.
///
/// Without an extractor no Condition resources are produced.
#[derive(Clone, Copy)]
pub struct BundleConverter<'a> {
    timestamp: ObservationTimestamp,
    extractor: Option<&'a dyn DiagnosisExtractor>,
}

impl<'a> BundleConverter<'a> {
    pub fn new(timestamp: ObservationTimestamp) -> Self {
        Self {
            timestamp,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: &'a dyn DiagnosisExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Convert rows into a collection bundle.
    ///
    /// Rows with a blank `patient_id` cannot be referenced and are skipped with a
    /// warning. Extractor failures never abort a row: they only suppress its
    /// Condition.
    pub fn convert<'r, I>(&self, rows: I) -> BundleData
    where
        I: IntoIterator<Item = &'r TabularRow>,
    {
        let effective = self.timestamp.resolve();
        let mut bundle = BundleData::collection(Some(Uuid::new_v4().simple().to_string()));
        let mut subjects = 0usize;

        for row in rows {
            let patient_id = row.patient_id.trim();
            if patient_id.is_empty() {
                tracing::warn!("skipping row without patient_id during conversion");
                continue;
            }
            subjects += 1;

            let subject = Reference::to(PATIENT_REFERENCE_KIND, patient_id);

            bundle.push(Resource::Patient(patient_resource(patient_id, row)));

            if let Some(condition) = self.condition_resource(patient_id, &subject, row) {
                bundle.push(Resource::Condition(condition));
            }

            bundle.push(Resource::Observation(heart_rate_observation(
                patient_id, &subject, &effective, row,
            )));
            bundle.push(Resource::Observation(blood_pressure_observation(
                patient_id, &subject, &effective, row,
            )));
        }

        tracing::info!(
            subjects,
            entries = bundle.len(),
            conditions = bundle.conditions().count(),
            "bundle conversion complete"
        );

        bundle
    }

    fn condition_resource(
        &self,
        patient_id: &str,
        subject: &Reference,
        row: &TabularRow,
    ) -> Option<ConditionData> {
        let extractor = self.extractor?;
        let note = row.note().filter(|n| should_extract(n))?;

        // Raw labels from any extractor get the same normalisation as HTTP replies.
        let extraction = match extractor.extract(note) {
            Extraction::Diagnosis(label) => Extraction::from_label(&label),
            other => other,
        };

        match extraction {
            Extraction::Diagnosis(label) => Some(ConditionData {
                id: format!("condition-{patient_id}"),
                subject: subject.clone(),
                code: Coding::new(EXTRACTED_DIAGNOSIS_SYSTEM, &condition_code(&label), &label),
                clinical_status: ClinicalStatus::Active,
            }),
            Extraction::NotFound => {
                tracing::debug!(patient_id, "no diagnosis found in notes");
                None
            }
            Extraction::Failed(error) => {
                tracing::warn!(patient_id, %error, "diagnosis extraction failed");
                None
            }
        }
    }
}

/// Local condition code: the label lower-cased with spaces replaced by underscores.
pub fn condition_code(label: &str) -> String {
    label.to_lowercase().replace(' ', "_")
}

fn optional_cell(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn patient_resource(patient_id: &str, row: &TabularRow) -> PatientData {
    PatientData {
        id: patient_id.to_string(),
        name: optional_cell(&row.name),
        gender: optional_cell(&row.gender).map(|g| g.to_lowercase()),
        birth_date: optional_cell(&row.dob),
        email: optional_cell(&row.email),
    }
}

fn vital_quantity(
    patient_id: &str,
    row: &TabularRow,
    vital: VitalSign,
    unit: &str,
) -> Option<Quantity> {
    let value = row.vital(vital);
    if value.is_none() {
        tracing::warn!(
            patient_id,
            column = vital.column(),
            value = row.vital_text(vital),
            "vital sign is not numeric; omitting value"
        );
    }
    value.map(|v| Quantity::new(v, unit))
}

fn heart_rate_observation(
    patient_id: &str,
    subject: &Reference,
    effective: &str,
    row: &TabularRow,
) -> ObservationData {
    ObservationData {
        id: format!("heart-rate-{patient_id}"),
        status: ObservationStatus::Final,
        code: Coding::new(LOINC_SYSTEM, HEART_RATE_CODE, HEART_RATE_DISPLAY),
        subject: subject.clone(),
        effective: effective.to_string(),
        value: vital_quantity(patient_id, row, VitalSign::HeartRate, HEART_RATE_UNIT),
        components: Vec::new(),
    }
}

fn blood_pressure_observation(
    patient_id: &str,
    subject: &Reference,
    effective: &str,
    row: &TabularRow,
) -> ObservationData {
    ObservationData {
        id: format!("blood-pressure-{patient_id}"),
        status: ObservationStatus::Final,
        code: Coding::new(
            LOINC_SYSTEM,
            BLOOD_PRESSURE_PANEL_CODE,
            BLOOD_PRESSURE_PANEL_DISPLAY,
        ),
        subject: subject.clone(),
        effective: effective.to_string(),
        value: None,
        components: vec![
            ObservationComponent {
                code: Coding::new(LOINC_SYSTEM, SYSTOLIC_CODE, SYSTOLIC_DISPLAY),
                value: vital_quantity(patient_id, row, VitalSign::Systolic, MMHG_UNIT),
            },
            ObservationComponent {
                code: Coding::new(LOINC_SYSTEM, DIASTOLIC_CODE, DIASTOLIC_DISPLAY),
                value: vital_quantity(patient_id, row, VitalSign::Diastolic, MMHG_UNIT),
            },
        ],
    }
}
