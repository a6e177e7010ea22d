//! FHIR-aligned Condition wire models and translation helpers.
//!
//! A condition records one diagnosis for a subject. In this pipeline conditions are
//! only produced from free-text extraction, so the code lives in a local coding system.

use crate::datatypes::{CodeableConceptWire, CodingWire, ReferenceWire};
use crate::{Coding, FhirError, Reference, CONDITION_CLINICAL_SYSTEM};
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Clinical status of a condition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClinicalStatus {
    Active,
    Recurrence,
    Relapse,
    Inactive,
    Remission,
    Resolved,
}

impl ClinicalStatus {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            ClinicalStatus::Active => "active",
            ClinicalStatus::Recurrence => "recurrence",
            ClinicalStatus::Relapse => "relapse",
            ClinicalStatus::Inactive => "inactive",
            ClinicalStatus::Remission => "remission",
            ClinicalStatus::Resolved => "resolved",
        }
    }

    /// Parse from FHIR wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ClinicalStatus::Active),
            "recurrence" => Some(ClinicalStatus::Recurrence),
            "relapse" => Some(ClinicalStatus::Relapse),
            "inactive" => Some(ClinicalStatus::Inactive),
            "remission" => Some(ClinicalStatus::Remission),
            "resolved" => Some(ClinicalStatus::Resolved),
            _ => None,
        }
    }
}

/// Domain-level carrier for a condition record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionData {
    pub id: String,

    /// Soft reference to the subject's Patient resource.
    pub subject: Reference,

    pub code: Coding,

    pub clinical_status: ClinicalStatus,
}

// ============================================================================
// Wire types (crate-internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConditionWire {
    pub id: String,

    #[serde(rename = "clinicalStatus")]
    pub clinical_status: CodeableConceptWire,

    pub code: CodeableConceptWire,

    pub subject: ReferenceWire,
}

// ============================================================================
// Translation helpers (crate-internal)
// ============================================================================

pub(crate) fn domain_to_wire(data: &ConditionData) -> ConditionWire {
    ConditionWire {
        id: data.id.clone(),
        clinical_status: CodeableConceptWire {
            coding: vec![CodingWire {
                system: CONDITION_CLINICAL_SYSTEM.to_string(),
                code: data.clinical_status.to_wire().to_string(),
                display: None,
            }],
            text: None,
        },
        code: data.code.to_concept(),
        subject: data.subject.to_wire(),
    }
}

pub(crate) fn wire_to_domain(wire: ConditionWire) -> Result<ConditionData, FhirError> {
    let status_coding = Coding::from_concept(wire.clinical_status, "Condition.clinicalStatus")?;
    let clinical_status = ClinicalStatus::from_wire(&status_coding.code).ok_or_else(|| {
        FhirError::Translation(format!(
            "unknown Condition.clinicalStatus '{}'",
            status_coding.code
        ))
    })?;

    Ok(ConditionData {
        id: wire.id,
        subject: Reference::from_wire(wire.subject)?,
        code: Coding::from_concept(wire.code, "Condition.code")?,
        clinical_status,
    })
}
