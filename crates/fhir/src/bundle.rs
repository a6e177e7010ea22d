//! FHIR-aligned Bundle wire models, rendering and parsing.
//!
//! The bundle is the pipeline's interchange document: an ordered list of entries,
//! each wrapping exactly one resource. Resources relate to each other only through
//! soft `subject` references.
//!
//! Responsibilities:
//! - Render a [`BundleData`] as JSON or YAML
//! - Parse a document back strictly, reporting the failing path on schema mismatch
//! - Provide the positional lookups a read-only consumer (e.g. a dashboard) needs

use crate::condition::{self, ConditionWire};
use crate::observation::{self, ObservationWire};
use crate::patient::{self, PatientWire};
use crate::{
    ConditionData, DocumentFormat, FhirError, FhirResult, ObservationData, PatientData,
};
use serde::{Deserialize, Serialize};

const PATIENT_KIND: &str = "Patient";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Bundle type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BundleType {
    Document,
    Message,
    Transaction,
    Batch,
    History,
    Searchset,
    #[default]
    Collection,
}

impl BundleType {
    /// Convert to FHIR wire format string.
    pub fn to_wire(self) -> &'static str {
        match self {
            BundleType::Document => "document",
            BundleType::Message => "message",
            BundleType::Transaction => "transaction",
            BundleType::Batch => "batch",
            BundleType::History => "history",
            BundleType::Searchset => "searchset",
            BundleType::Collection => "collection",
        }
    }

    /// Parse from FHIR wire format string.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "document" => Some(BundleType::Document),
            "message" => Some(BundleType::Message),
            "transaction" => Some(BundleType::Transaction),
            "batch" => Some(BundleType::Batch),
            "history" => Some(BundleType::History),
            "searchset" => Some(BundleType::Searchset),
            "collection" => Some(BundleType::Collection),
            _ => None,
        }
    }
}

/// One clinical record wrapped by a bundle entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Resource {
    Patient(PatientData),
    Condition(ConditionData),
    Observation(ObservationData),
}

impl Resource {
    /// FHIR `resourceType` of the wrapped record.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Patient(_) => PATIENT_KIND,
            Resource::Condition(_) => "Condition",
            Resource::Observation(_) => "Observation",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Resource::Patient(p) => &p.id,
            Resource::Condition(c) => &c.id,
            Resource::Observation(o) => &o.id,
        }
    }

    /// Patient id this record belongs to. For a Patient that is its own id.
    pub fn subject_id(&self) -> &str {
        match self {
            Resource::Patient(p) => &p.id,
            Resource::Condition(c) => c.subject.id(),
            Resource::Observation(o) => o.subject.id(),
        }
    }
}

/// Domain-level carrier for a bundle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BundleData {
    pub id: Option<String>,
    pub bundle_type: BundleType,
    pub entries: Vec<Resource>,
}

impl BundleData {
    /// Create an empty collection bundle.
    pub fn collection(id: Option<String>) -> Self {
        Self {
            id,
            bundle_type: BundleType::Collection,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, resource: Resource) {
        self.entries.push(resource);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All identity records, in document order.
    pub fn patients(&self) -> impl Iterator<Item = &PatientData> {
        self.entries.iter().filter_map(|e| match e {
            Resource::Patient(p) => Some(p),
            _ => None,
        })
    }

    /// All condition records, in document order.
    pub fn conditions(&self) -> impl Iterator<Item = &ConditionData> {
        self.entries.iter().filter_map(|e| match e {
            Resource::Condition(c) => Some(c),
            _ => None,
        })
    }

    /// All observation records, in document order.
    pub fn observations(&self) -> impl Iterator<Item = &ObservationData> {
        self.entries.iter().filter_map(|e| match e {
            Resource::Observation(o) => Some(o),
            _ => None,
        })
    }

    /// Conditions whose subject references `Patient/<patient_id>`.
    pub fn conditions_for<'a>(
        &'a self,
        patient_id: &'a str,
    ) -> impl Iterator<Item = &'a ConditionData> + 'a {
        self.conditions()
            .filter(move |c| is_patient_subject(c.subject.kind(), c.subject.id(), patient_id))
    }

    /// Observations whose subject references `Patient/<patient_id>`.
    pub fn observations_for<'a>(
        &'a self,
        patient_id: &'a str,
    ) -> impl Iterator<Item = &'a ObservationData> + 'a {
        self.observations()
            .filter(move |o| is_patient_subject(o.subject.kind(), o.subject.id(), patient_id))
    }

    /// The first observation for a patient coded (at `coding[0]`) with `code`.
    pub fn observation_for(&self, patient_id: &str, code: &str) -> Option<&ObservationData> {
        self.observations().find(|o| {
            o.code.code == code && is_patient_subject(o.subject.kind(), o.subject.id(), patient_id)
        })
    }
}

fn is_patient_subject(kind: &str, id: &str, patient_id: &str) -> bool {
    kind == PATIENT_KIND && id == patient_id
}

// ============================================================================
// Public Bundle operations
// ============================================================================

/// Bundle operations.
///
/// This is a zero-sized type used for namespacing bundle-related operations.
/// All methods are associated functions.
pub struct Bundle;

impl Bundle {
    /// Parse a bundle document.
    ///
    /// This uses `serde_path_to_error` to surface a best-effort "path" (e.g.
    /// `entry[3].resource.status`) to the failing field when the text does not match
    /// the wire schema.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the text is not valid JSON/YAML or does not match the wire schema,
    /// - any unknown keys are present (due to `#[serde(deny_unknown_fields)]`),
    /// - `resourceType` is not "Bundle" or the bundle type is unknown,
    /// - a resource fails domain translation (empty coding, bad reference, unknown status).
    pub fn parse(text: &str, format: DocumentFormat) -> FhirResult<BundleData> {
        let wire = match format {
            DocumentFormat::Json => {
                deserialize_wire(&mut serde_json::Deserializer::from_str(text))?
            }
            DocumentFormat::Yaml => deserialize_wire(serde_yaml::Deserializer::from_str(text))?,
        };

        if wire.resource_type != "Bundle" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Bundle', got '{}'",
                wire.resource_type
            )));
        }

        wire_to_domain(wire)
    }

    /// Render a bundle document.
    ///
    /// JSON output is pretty-printed.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if serialisation fails.
    pub fn render(data: &BundleData, format: DocumentFormat) -> FhirResult<String> {
        let wire = domain_to_wire(data);
        match format {
            DocumentFormat::Json => Ok(serde_json::to_string_pretty(&wire)?),
            DocumentFormat::Yaml => Ok(serde_yaml::to_string(&wire)?),
        }
    }
}

fn deserialize_wire<'de, D>(deserializer: D) -> FhirResult<BundleWire>
where
    D: serde::Deserializer<'de>,
{
    serde_path_to_error::deserialize::<_, BundleWire>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        FhirError::Translation(format!("Bundle schema mismatch at {path}: {source}"))
    })
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct BundleWire {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub bundle_type: String,

    #[serde(default)]
    pub entry: Vec<EntryWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct EntryWire {
    pub resource: ResourceWire,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "resourceType")]
enum ResourceWire {
    Patient(PatientWire),
    Condition(ConditionWire),
    Observation(ObservationWire),
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn domain_to_wire(data: &BundleData) -> BundleWire {
    BundleWire {
        resource_type: "Bundle".to_string(),
        id: data.id.clone(),
        bundle_type: data.bundle_type.to_wire().to_string(),
        entry: data
            .entries
            .iter()
            .map(|resource| EntryWire {
                resource: match resource {
                    Resource::Patient(p) => ResourceWire::Patient(patient::domain_to_wire(p)),
                    Resource::Condition(c) => {
                        ResourceWire::Condition(condition::domain_to_wire(c))
                    }
                    Resource::Observation(o) => {
                        ResourceWire::Observation(observation::domain_to_wire(o))
                    }
                },
            })
            .collect(),
    }
}

fn wire_to_domain(wire: BundleWire) -> FhirResult<BundleData> {
    let bundle_type = BundleType::from_wire(&wire.bundle_type).ok_or_else(|| {
        FhirError::Translation(format!("unknown Bundle.type '{}'", wire.bundle_type))
    })?;

    let entries = wire
        .entry
        .into_iter()
        .map(|entry| match entry.resource {
            ResourceWire::Patient(p) => patient::wire_to_domain(p).map(Resource::Patient),
            ResourceWire::Condition(c) => condition::wire_to_domain(c).map(Resource::Condition),
            ResourceWire::Observation(o) => {
                observation::wire_to_domain(o).map(Resource::Observation)
            }
        })
        .collect::<FhirResult<Vec<_>>>()?;

    Ok(BundleData {
        id: wire.id,
        bundle_type,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ClinicalStatus, Coding, ObservationStatus, Quantity, Reference,
        EXTRACTED_DIAGNOSIS_SYSTEM, HEART_RATE_CODE, LOINC_SYSTEM,
    };

    fn sample_bundle() -> BundleData {
        let mut bundle = BundleData::collection(Some("b-1".into()));
        bundle.push(Resource::Patient(PatientData {
            id: "P-001".into(),
            name: Some("Sarah Williams".into()),
            gender: Some("female".into()),
            birth_date: Some("1992-03-20".into()),
            email: Some("sarah@example.com".into()),
        }));
        bundle.push(Resource::Condition(ConditionData {
            id: "condition-P-001".into(),
            subject: Reference::to("Patient", "P-001"),
            code: Coding::new(EXTRACTED_DIAGNOSIS_SYSTEM, "asthma", "Asthma"),
            clinical_status: ClinicalStatus::Active,
        }));
        bundle.push(Resource::Observation(ObservationData {
            id: "heart-rate-P-001".into(),
            status: ObservationStatus::Final,
            code: Coding::new(LOINC_SYSTEM, HEART_RATE_CODE, "Heart rate"),
            subject: Reference::to("Patient", "P-001"),
            effective: "2023-10-27".into(),
            value: Some(Quantity::new(72.0, "beats/minute")),
            components: vec![],
        }));
        bundle
    }

    #[test]
    fn renders_collection_with_typed_entries() {
        let json = Bundle::render(&sample_bundle(), DocumentFormat::Json).expect("render");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["resourceType"], "Bundle");
        assert_eq!(value["type"], "collection");
        assert_eq!(value["entry"][0]["resource"]["resourceType"], "Patient");
        assert_eq!(value["entry"][1]["resource"]["resourceType"], "Condition");
        assert_eq!(
            value["entry"][2]["resource"]["subject"]["reference"],
            "Patient/P-001"
        );
        assert_eq!(
            value["entry"][2]["resource"]["valueQuantity"]["unit"],
            "beats/minute"
        );
    }

    #[test]
    fn parses_rendered_json_and_yaml() {
        for format in [DocumentFormat::Json, DocumentFormat::Yaml] {
            let text = Bundle::render(&sample_bundle(), format).expect("render");
            let parsed = Bundle::parse(&text, format).expect("parse");
            assert_eq!(parsed, sample_bundle(), "{format:?}");
        }
    }

    #[test]
    fn read_side_lookups_follow_subject_references() {
        let bundle = sample_bundle();
        assert_eq!(bundle.patients().count(), 1);
        assert_eq!(bundle.conditions_for("P-001").count(), 1);
        assert_eq!(bundle.conditions_for("P-999").count(), 0);
        let hr = bundle
            .observation_for("P-001", HEART_RATE_CODE)
            .expect("heart rate present");
        assert_eq!(hr.value.as_ref().map(|q| q.value), Some(72.0));
    }

    #[test]
    fn observation_lookup_outlives_borrowed_patient_id() {
        let bundle = sample_bundle();
        let found = {
            let patient_id = String::from("P-001");
            bundle.observation_for(&patient_id, HEART_RATE_CODE)
        };
        assert_eq!(found.map(|o| o.id.as_str()), Some("heart-rate-P-001"));
    }

    #[test]
    fn serialisation_errors_keep_their_format() {
        let json = serde_json::from_str::<serde_json::Value>("{").expect_err("bad json");
        assert!(matches!(FhirError::from(json), FhirError::InvalidJson(_)));
        let yaml = serde_yaml::from_str::<serde_yaml::Value>("a: [").expect_err("bad yaml");
        assert!(matches!(FhirError::from(yaml), FhirError::InvalidYaml(_)));
    }

    #[test]
    fn rejects_wrong_resource_type() {
        let input = r#"{"resourceType": "Patient", "type": "collection"}"#;
        let err = Bundle::parse(input, DocumentFormat::Json).expect_err("should reject");
        match err {
            FhirError::InvalidInput(msg) => {
                assert!(msg.contains("Bundle"));
                assert!(msg.contains("Patient"));
            }
            other => panic!("expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn strict_validation_reports_unknown_key_path() {
        let input = r#"{"resourceType": "Bundle", "type": "collection", "unexpected_key": 1}"#;
        let err = Bundle::parse(input, DocumentFormat::Json).expect_err("should reject");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("unexpected_key")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_entry_resource_type() {
        let input = r#"{"resourceType": "Bundle", "type": "collection",
            "entry": [{"resource": {"resourceType": "Encounter", "id": "e1"}}]}"#;
        let err = Bundle::parse(input, DocumentFormat::Json).expect_err("should reject");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("entry")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_bundle_type() {
        let input = r#"{"resourceType": "Bundle", "type": "pile"}"#;
        let err = Bundle::parse(input, DocumentFormat::Json).expect_err("should reject");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("pile")));
    }
}
