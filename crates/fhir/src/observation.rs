//! FHIR-aligned Observation wire models and translation helpers.
//!
//! Observations carry either a single `valueQuantity` (heart rate) or a list of
//! coded components (blood pressure panel). Component order is significant:
//! consumers read `component[0]` as systolic and `component[1]` as diastolic.

use crate::datatypes::{CodeableConceptWire, QuantityWire, ReferenceWire};
use crate::{Coding, FhirError, Quantity, Reference};
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Status of an observation result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationStatus {
    Registered,
    Preliminary,
    Final,
    Amended,
}

impl ObservationStatus {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            ObservationStatus::Registered => "registered",
            ObservationStatus::Preliminary => "preliminary",
            ObservationStatus::Final => "final",
            ObservationStatus::Amended => "amended",
        }
    }

    /// Parse from FHIR wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(ObservationStatus::Registered),
            "preliminary" => Some(ObservationStatus::Preliminary),
            "final" => Some(ObservationStatus::Final),
            "amended" => Some(ObservationStatus::Amended),
            _ => None,
        }
    }
}

/// One coded sub-measurement of an observation.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationComponent {
    pub code: Coding,
    /// `None` when the source value was missing or not numeric.
    pub value: Option<Quantity>,
}

/// Domain-level carrier for an observation record.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationData {
    pub id: String,
    pub status: ObservationStatus,
    pub code: Coding,

    /// Soft reference to the subject's Patient resource.
    pub subject: Reference,

    /// FHIR `dateTime` (a date or an RFC 3339 timestamp).
    pub effective: String,

    pub value: Option<Quantity>,
    pub components: Vec<ObservationComponent>,
}

impl ObservationData {
    /// Find a component by its code.
    pub fn component(&self, code: &str) -> Option<&ObservationComponent> {
        self.components.iter().find(|c| c.code.code == code)
    }
}

// ============================================================================
// Wire types (crate-internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ObservationWire {
    pub id: String,

    pub status: String,

    pub code: CodeableConceptWire,

    pub subject: ReferenceWire,

    #[serde(rename = "effectiveDateTime")]
    pub effective_date_time: String,

    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<QuantityWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<ObservationComponentWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ObservationComponentWire {
    pub code: CodeableConceptWire,

    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<QuantityWire>,
}

// ============================================================================
// Translation helpers (crate-internal)
// ============================================================================

pub(crate) fn domain_to_wire(data: &ObservationData) -> ObservationWire {
    ObservationWire {
        id: data.id.clone(),
        status: data.status.to_wire().to_string(),
        code: data.code.to_concept(),
        subject: data.subject.to_wire(),
        effective_date_time: data.effective.clone(),
        value_quantity: data.value.as_ref().map(Quantity::to_wire),
        component: data
            .components
            .iter()
            .map(|c| ObservationComponentWire {
                code: c.code.to_concept(),
                value_quantity: c.value.as_ref().map(Quantity::to_wire),
            })
            .collect(),
    }
}

pub(crate) fn wire_to_domain(wire: ObservationWire) -> Result<ObservationData, FhirError> {
    let status = ObservationStatus::from_wire(&wire.status).ok_or_else(|| {
        FhirError::Translation(format!("unknown Observation.status '{}'", wire.status))
    })?;

    let components = wire
        .component
        .into_iter()
        .enumerate()
        .map(|(i, c)| {
            Ok(ObservationComponent {
                code: Coding::from_concept(c.code, &format!("Observation.component[{i}].code"))?,
                value: c.value_quantity.map(Quantity::from_wire),
            })
        })
        .collect::<Result<Vec<_>, FhirError>>()?;

    Ok(ObservationData {
        id: wire.id,
        status,
        code: Coding::from_concept(wire.code, "Observation.code")?,
        subject: Reference::from_wire(wire.subject)?,
        effective: wire.effective_date_time,
        value: wire.value_quantity.map(Quantity::from_wire),
        components,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DIASTOLIC_CODE, LOINC_SYSTEM, MMHG_UNIT, SYSTOLIC_CODE};

    fn blood_pressure() -> ObservationData {
        ObservationData {
            id: "bp-P-001".into(),
            status: ObservationStatus::Final,
            code: Coding::new(LOINC_SYSTEM, "85354-9", "Blood pressure panel"),
            subject: Reference::to("Patient", "P-001"),
            effective: "2023-10-27".into(),
            value: None,
            components: vec![
                ObservationComponent {
                    code: Coding::new(LOINC_SYSTEM, SYSTOLIC_CODE, "Systolic blood pressure"),
                    value: Some(Quantity::new(120.0, MMHG_UNIT)),
                },
                ObservationComponent {
                    code: Coding::new(LOINC_SYSTEM, DIASTOLIC_CODE, "Diastolic blood pressure"),
                    value: Some(Quantity::new(80.0, MMHG_UNIT)),
                },
            ],
        }
    }

    #[test]
    fn panel_serialises_components_in_order_without_value() {
        let json = serde_json::to_value(domain_to_wire(&blood_pressure())).expect("serialise");
        assert!(json.get("valueQuantity").is_none());
        assert_eq!(json["component"][0]["code"]["coding"][0]["code"], SYSTOLIC_CODE);
        assert_eq!(json["component"][1]["code"]["coding"][0]["code"], DIASTOLIC_CODE);
        assert_eq!(json["component"][1]["valueQuantity"]["value"], 80.0);
        assert_eq!(json["effectiveDateTime"], "2023-10-27");
        assert_eq!(json["status"], "final");
    }

    #[test]
    fn component_lookup_by_code() {
        let bp = blood_pressure();
        let systolic = bp.component(SYSTOLIC_CODE).expect("systolic present");
        assert_eq!(systolic.value.as_ref().map(|q| q.value), Some(120.0));
        assert!(bp.component("0000-0").is_none());
    }

    #[test]
    fn rejects_unknown_status() {
        let mut wire = domain_to_wire(&blood_pressure());
        wire.status = "guessed".into();
        let err = wire_to_domain(wire).expect_err("should reject status");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("guessed")));
    }

    #[test]
    fn empty_component_coding_reports_index() {
        let mut wire = domain_to_wire(&blood_pressure());
        wire.component[1].code.coding.clear();
        let err = wire_to_domain(wire).expect_err("should reject empty coding");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("component[1]")));
    }
}
