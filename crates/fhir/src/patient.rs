//! FHIR-aligned Patient (identity record) wire models and translation helpers.
//!
//! Responsibilities:
//! - Define the flat domain carrier used by the bundle converter
//! - Define a strict wire model for serialisation/deserialisation
//! - Translate between the two
//!
//! Notes:
//! - The email address is carried as a single `home` email contact point
//! - The name is carried as `name[0].text`; the source data has no given/family split

use crate::FhirError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Domain-level carrier for patient identity data (flat structure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    /// Resource id; equal to the source `patient_id`.
    pub id: String,

    /// Full display name.
    pub name: Option<String>,

    /// FHIR administrative gender code (lower-case).
    pub gender: Option<String>,

    /// Date of birth (ISO 8601 date format: YYYY-MM-DD).
    pub birth_date: Option<String>,

    /// Home email address.
    pub email: Option<String>,
}

// ============================================================================
// Wire types (crate-internal)
// ============================================================================

/// Wire representation of a patient resource.
///
/// `resourceType` is handled by the enclosing resource enum.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct PatientWire {
    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanNameWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,

    #[serde(rename = "birthDate", skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub telecom: Vec<ContactPointWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct HumanNameWire {
    pub text: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ContactPointWire {
    pub system: String,
    pub value: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_type: Option<String>,
}

const EMAIL_SYSTEM: &str = "email";
const HOME_USE: &str = "home";

// ============================================================================
// Translation helpers (crate-internal)
// ============================================================================

pub(crate) fn domain_to_wire(data: &PatientData) -> PatientWire {
    PatientWire {
        id: data.id.clone(),
        name: data
            .name
            .iter()
            .map(|text| HumanNameWire { text: text.clone() })
            .collect(),
        gender: data.gender.clone(),
        birth_date: data.birth_date.clone(),
        telecom: data
            .email
            .iter()
            .map(|email| ContactPointWire {
                system: EMAIL_SYSTEM.to_string(),
                value: email.clone(),
                use_type: Some(HOME_USE.to_string()),
            })
            .collect(),
    }
}

pub(crate) fn wire_to_domain(wire: PatientWire) -> Result<PatientData, FhirError> {
    if wire.id.trim().is_empty() {
        return Err(FhirError::Translation("Patient.id must not be empty".into()));
    }

    // Flat structure keeps the first name and the first email contact point
    let name = wire.name.into_iter().next().map(|n| n.text);
    let email = wire
        .telecom
        .into_iter()
        .find(|t| t.system == EMAIL_SYSTEM)
        .map(|t| t.value);

    Ok(PatientData {
        id: wire.id,
        name,
        gender: wire.gender,
        birth_date: wire.birth_date,
        email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PatientData {
        PatientData {
            id: "P-001".into(),
            name: Some("Sarah Williams".into()),
            gender: Some("female".into()),
            birth_date: Some("1992-03-20".into()),
            email: Some("sarah@example.com".into()),
        }
    }

    #[test]
    fn email_becomes_home_contact_point() {
        let wire = domain_to_wire(&sample());
        assert_eq!(wire.telecom.len(), 1);
        assert_eq!(wire.telecom[0].system, "email");
        assert_eq!(wire.telecom[0].use_type.as_deref(), Some("home"));
        assert_eq!(wire.telecom[0].value, "sarah@example.com");
        assert_eq!(wire.name[0].text, "Sarah Williams");
    }

    #[test]
    fn minimal_patient_omits_optional_fields() {
        let data = PatientData {
            id: "P-002".into(),
            name: None,
            gender: None,
            birth_date: None,
            email: None,
        };
        let json = serde_json::to_string(&domain_to_wire(&data)).expect("serialise");
        assert_eq!(json, r#"{"id":"P-002"}"#);
    }

    #[test]
    fn wire_to_domain_rejects_blank_id() {
        let mut wire = domain_to_wire(&sample());
        wire.id = "  ".into();
        let err = wire_to_domain(wire).expect_err("should reject blank id");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("Patient.id")));
    }

    #[test]
    fn wire_to_domain_restores_flat_fields() {
        let restored = wire_to_domain(domain_to_wire(&sample())).expect("translate");
        assert_eq!(restored, sample());
    }
}
