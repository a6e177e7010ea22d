//! Shared FHIR datatypes: codings, quantities and soft references.
//!
//! Each type has a public domain-level form and a crate-private wire form. Resources
//! compose the wire forms; translation happens through `to_wire`/`from_wire`.

use crate::FhirError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// A single code from a coding system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coding {
    /// Coding system URI.
    pub system: String,
    pub code: String,
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: &str, code: &str, display: &str) -> Self {
        Self {
            system: system.to_string(),
            code: code.to_string(),
            display: Some(display.to_string()),
        }
    }
}

/// A measured amount with a unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
        }
    }
}

/// A soft reference of the form `"<Kind>/<id>"`.
///
/// References are lookup keys into the bundle, never ownership pointers. Nothing
/// guarantees the target exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Reference(String);

impl Reference {
    /// Build a reference to a resource of `kind` with the given id.
    pub fn to(kind: &str, id: &str) -> Self {
        Self(format!("{kind}/{id}"))
    }

    /// Parse a `"<Kind>/<id>"` reference string.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if either side of the `/` is empty.
    pub fn parse(reference: &str) -> Result<Self, FhirError> {
        match reference.split_once('/') {
            Some((kind, id)) if !kind.is_empty() && !id.is_empty() => {
                Ok(Self(reference.to_string()))
            }
            _ => Err(FhirError::InvalidInput(format!(
                "reference '{reference}' is not of the form Kind/id"
            ))),
        }
    }

    /// The resource kind (e.g. `Patient`).
    pub fn kind(&self) -> &str {
        self.0.split_once('/').map(|(kind, _)| kind).unwrap_or("")
    }

    /// The referenced resource id.
    pub fn id(&self) -> &str {
        self.0.split_once('/').map(|(_, id)| id).unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Wire types (crate-internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct CodingWire {
    pub system: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// `CodeableConcept` reduced to its coding list and optional text.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct CodeableConceptWire {
    #[serde(default)]
    pub coding: Vec<CodingWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct QuantityWire {
    pub value: f64,
    pub unit: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ReferenceWire {
    pub reference: String,
}

// ============================================================================
// Translation helpers (crate-internal)
// ============================================================================

impl Coding {
    pub(crate) fn to_wire(&self) -> CodingWire {
        CodingWire {
            system: self.system.clone(),
            code: self.code.clone(),
            display: self.display.clone(),
        }
    }

    pub(crate) fn from_wire(wire: CodingWire) -> Self {
        Self {
            system: wire.system,
            code: wire.code,
            display: wire.display,
        }
    }

    /// Wrap this coding as the single entry of a `CodeableConcept`.
    pub(crate) fn to_concept(&self) -> CodeableConceptWire {
        CodeableConceptWire {
            coding: vec![self.to_wire()],
            text: None,
        }
    }

    /// Take `coding[0]` of a concept; consumers read codes positionally.
    pub(crate) fn from_concept(concept: CodeableConceptWire, path: &str) -> Result<Self, FhirError> {
        concept
            .coding
            .into_iter()
            .next()
            .map(Coding::from_wire)
            .ok_or_else(|| FhirError::Translation(format!("{path}.coding must not be empty")))
    }
}

impl Quantity {
    pub(crate) fn to_wire(&self) -> QuantityWire {
        QuantityWire {
            value: self.value,
            unit: self.unit.clone(),
        }
    }

    pub(crate) fn from_wire(wire: QuantityWire) -> Self {
        Self {
            value: wire.value,
            unit: wire.unit,
        }
    }
}

impl Reference {
    pub(crate) fn to_wire(&self) -> ReferenceWire {
        ReferenceWire {
            reference: self.0.clone(),
        }
    }

    pub(crate) fn from_wire(wire: ReferenceWire) -> Result<Self, FhirError> {
        Reference::parse(&wire.reference)
    }
}
