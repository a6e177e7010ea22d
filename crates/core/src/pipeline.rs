//! Batch pipeline orchestration.
//!
//! A run is three passes over one immutable [`Dataset`]:
//! 1. fit the anomaly scorer on the whole batch and annotate every row
//! 2. partition annotated rows into valid and invalid sinks
//! 3. convert rows (all of them, or only the valid ones) into one bundle
//!
//! Every artifact is fully computed in memory before anything is written, and
//! each file is committed atomically.

use crate::anomaly::AnomalyScorer;
use crate::config::{ConversionInput, PipelineConfig};
use crate::constants::{BUNDLE_FILE_STEM, INVALID_RECORDS_FILENAME, VALID_RECORDS_FILENAME};
use crate::conversion::BundleConverter;
use crate::dataset::Dataset;
use crate::extractor::DiagnosisExtractor;
use crate::record::{AnomalyAnnotation, AnomalyStatus};
use crate::sink;
use crate::validation::{self, ValidationOutcome};
use crate::{PipelineError, PipelineResult};
use fhir::{Bundle, BundleData, DocumentFormat};
use std::fmt;
use std::path::{Path, PathBuf};

/// Artifact locations for one output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub valid: PathBuf,
    pub invalid: PathBuf,
    pub document: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path, format: DocumentFormat) -> Self {
        Self {
            valid: dir.join(VALID_RECORDS_FILENAME),
            invalid: dir.join(INVALID_RECORDS_FILENAME),
            document: dir.join(format!("{BUNDLE_FILE_STEM}.{}", format.extension())),
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub anomalies: usize,
    pub entries: usize,
    pub conditions: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows: {} valid, {} invalid, {} anomalies; {} bundle entries ({} conditions)",
            self.total, self.valid, self.invalid, self.anomalies, self.entries, self.conditions
        )
    }
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    extractor: Option<&'a dyn DiagnosisExtractor>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: &'a dyn DiagnosisExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fit the scorer on the batch and annotate every row.
    pub fn score(&self, dataset: &Dataset) -> Vec<AnomalyAnnotation> {
        AnomalyScorer::new(self.config.scorer().clone()).score(dataset.rows())
    }

    /// Score, then partition into valid and invalid sinks.
    pub fn validate(&self, dataset: &Dataset) -> PipelineResult<ValidationOutcome> {
        let annotations = self.score(dataset);
        validation::partition(dataset.rows(), &annotations)
    }

    /// Build the bundle according to the configured conversion input.
    pub fn convert(&self, dataset: &Dataset) -> BundleData {
        let mut converter = BundleConverter::new(self.config.observation_timestamp());
        if let Some(extractor) = self.extractor {
            converter = converter.with_extractor(extractor);
        }

        match self.config.conversion_input() {
            ConversionInput::Raw => {
                for row in dataset.rows() {
                    let violations = validation::row_violations(row);
                    if !violations.is_empty() {
                        tracing::debug!(
                            patient_id = %row.patient_id,
                            error = %validation::describe(&violations),
                            "converting row that fails validation"
                        );
                    }
                }
                converter.convert(dataset.rows())
            }
            ConversionInput::ValidOnly => converter.convert(
                dataset
                    .rows()
                    .iter()
                    .filter(|row| validation::row_violations(row).is_empty()),
            ),
        }
    }

    /// Run every pass and commit the three artifacts into `output_dir`.
    ///
    /// All three are staged before any is renamed into place.
    ///
    /// # Errors
    ///
    /// - `EmptyDataset` if there are no rows
    /// - `Document` if the bundle cannot be rendered
    /// - file errors while committing artifacts
    pub fn run(&self, dataset: &Dataset, output_dir: &Path) -> PipelineResult<RunSummary> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }

        let outcome = self.validate(dataset)?;
        let bundle = self.convert(dataset);
        let format = self.config.document_format();
        let document = Bundle::render(&bundle, format)?;

        let paths = OutputPaths::in_dir(output_dir, format);
        let staged = vec![
            sink::stage_valid_records(&paths.valid, &outcome.valid)?,
            sink::stage_invalid_records(&paths.invalid, &outcome.invalid)?,
            sink::stage_text(&paths.document, &document)?,
        ];
        sink::commit(staged)?;

        let anomalies = outcome
            .valid
            .iter()
            .map(|r| r.anomaly.status)
            .chain(outcome.invalid.iter().map(|r| r.anomaly.status))
            .filter(|s| *s == AnomalyStatus::Anomaly)
            .count();

        let summary = RunSummary {
            total: outcome.total(),
            valid: outcome.valid.len(),
            invalid: outcome.invalid.len(),
            anomalies,
            entries: bundle.len(),
            conditions: bundle.conditions().count(),
        };
        tracing::info!(
            total = summary.total,
            valid = summary.valid,
            invalid = summary.invalid,
            anomalies = summary.anomalies,
            entries = summary.entries,
            conditions = summary.conditions,
            output_dir = %output_dir.display(),
            "pipeline run complete"
        );

        Ok(summary)
    }
}
