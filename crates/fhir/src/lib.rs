//! FHIR wire/boundary support for the EMR pipeline.
//!
//! This crate provides **wire models** and **format/translation helpers** for the
//! interchange document produced by the bundle converter:
//! - a `collection` Bundle whose entries each wrap one Patient, Condition or Observation
//! - JSON (default) or YAML serialisation
//!
//! This crate focuses on:
//! - FHIR semantic alignment for the handful of fields the pipeline touches
//! - serialisation/deserialisation with strict, path-aware parse errors
//! - translation between domain carriers and wire structs
//!
//! It deliberately models only those fields. It is not a general FHIR resource library.

pub mod bundle;
pub mod condition;
pub mod datatypes;
pub mod observation;
pub mod patient;

// Re-export facades
pub use bundle::Bundle;

// Re-export public domain-level types
pub use bundle::{BundleData, BundleType, Resource};
pub use condition::{ClinicalStatus, ConditionData};
pub use datatypes::{Coding, Quantity, Reference};
pub use observation::{ObservationComponent, ObservationData, ObservationStatus};
pub use patient::PatientData;

/// Coding system for vital-sign observations.
pub const LOINC_SYSTEM: &str = "http://loinc.org";

/// Local coding system for diagnoses extracted from free-text notes.
pub const EXTRACTED_DIAGNOSIS_SYSTEM: &str =
    "http://example.org/fhir/CodeSystem/llm-extracted-diagnosis";

/// HL7 condition clinical-status coding system.
pub const CONDITION_CLINICAL_SYSTEM: &str =
    "http://terminology.hl7.org/CodeSystem/condition-clinical";

/// Heart rate observation code.
pub const HEART_RATE_CODE: &str = "8867-4";
pub const HEART_RATE_DISPLAY: &str = "Heart rate";
pub const HEART_RATE_UNIT: &str = "beats/minute";

/// Blood pressure panel observation code.
pub const BLOOD_PRESSURE_PANEL_CODE: &str = "85354-9";
pub const BLOOD_PRESSURE_PANEL_DISPLAY: &str = "Blood pressure panel";

pub const SYSTOLIC_CODE: &str = "8480-6";
pub const SYSTOLIC_DISPLAY: &str = "Systolic blood pressure";

pub const DIASTOLIC_CODE: &str = "8462-4";
pub const DIASTOLIC_DISPLAY: &str = "Diastolic blood pressure";

pub const MMHG_UNIT: &str = "mmHg";

/// Serialisation format of the interchange document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DocumentFormat {
    #[default]
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Conventional file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            DocumentFormat::Json => "json",
            DocumentFormat::Yaml => "yaml",
        }
    }
}

impl std::str::FromStr for DocumentFormat {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(DocumentFormat::Json),
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            other => Err(FhirError::InvalidInput(format!(
                "unknown document format '{other}' (expected json or yaml)"
            ))),
        }
    }
}

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
