//! # EMR Core
//!
//! Batch ETL for synthetic electronic medical records.
//!
//! This crate contains the pure pipeline logic:
//! - Dataset loading with a required-column check
//! - Batch anomaly scoring over vital signs (isolation forest)
//! - Row validation into valid and invalid sinks
//! - Conversion of rows and free-text notes into one clinical document
//! - Atomic output sinks and run orchestration
//!
//! **No transport concerns**: the diagnosis extractor is a trait here; the HTTP
//! adapter lives in `emr-extractor`, and argument parsing belongs in `emr-cli`.

pub mod anomaly;
pub mod config;
pub mod constants;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod record;
pub mod sink;
pub mod validation;

pub use anomaly::AnomalyScorer;
pub use config::{ConversionInput, ObservationTimestamp, PipelineConfig, ScorerConfig};
pub use conversion::BundleConverter;
pub use dataset::Dataset;
pub use error::{PipelineError, PipelineResult};
pub use extractor::{DiagnosisExtractor, Extraction};
pub use pipeline::{OutputPaths, Pipeline, RunSummary};
pub use record::{AnomalyAnnotation, AnomalyStatus, InvalidRecord, TabularRow, ValidatedRecord};
pub use validation::{FieldViolation, ValidationOutcome};

pub use fhir::DocumentFormat;
