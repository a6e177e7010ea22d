//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the
//! scorer, converter and pipeline. Nothing in this crate reads environment variables
//! while processing rows.

use crate::constants::{
    DEFAULT_CONTAMINATION, DEFAULT_MAX_SAMPLES, DEFAULT_OBSERVATION_DATE, DEFAULT_SEED,
    DEFAULT_TREES,
};
use crate::{PipelineError, PipelineResult};
use chrono::{NaiveDate, SecondsFormat, Utc};
use fhir::DocumentFormat;
use std::str::FromStr;

/// Isolation-forest settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ScorerConfig {
    contamination: f64,
    seed: u64,
    n_trees: usize,
    max_samples: usize,
}

impl ScorerConfig {
    /// Create a new `ScorerConfig`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidInput` if `contamination` is outside `(0, 0.5]`
    /// or either count is zero.
    pub fn new(
        contamination: f64,
        seed: u64,
        n_trees: usize,
        max_samples: usize,
    ) -> PipelineResult<Self> {
        if !(contamination > 0.0 && contamination <= 0.5) {
            return Err(PipelineError::InvalidInput(format!(
                "contamination must be in (0, 0.5], got {contamination}"
            )));
        }
        if n_trees == 0 {
            return Err(PipelineError::InvalidInput(
                "number of isolation trees must be at least 1".into(),
            ));
        }
        if max_samples == 0 {
            return Err(PipelineError::InvalidInput(
                "max samples per tree must be at least 1".into(),
            ));
        }

        Ok(Self {
            contamination,
            seed,
            n_trees,
            max_samples,
        })
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_SEED,
            n_trees: DEFAULT_TREES,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Effective time stamped on generated observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationTimestamp {
    /// The same calendar date on every observation.
    Fixed(NaiveDate),
    /// The wall-clock time at which the conversion pass starts.
    Now,
}

impl ObservationTimestamp {
    /// Resolve to a FHIR `dateTime` string.
    ///
    /// `Now` is resolved by the caller once per pass so every observation in a
    /// document shares one timestamp.
    pub fn resolve(self) -> String {
        match self {
            ObservationTimestamp::Fixed(date) => date.format("%Y-%m-%d").to_string(),
            ObservationTimestamp::Now => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

impl Default for ObservationTimestamp {
    fn default() -> Self {
        // The constant is a valid ISO date; parsing cannot fail.
        match NaiveDate::parse_from_str(DEFAULT_OBSERVATION_DATE, "%Y-%m-%d") {
            Ok(date) => ObservationTimestamp::Fixed(date),
            Err(_) => ObservationTimestamp::Now,
        }
    }
}

impl FromStr for ObservationTimestamp {
    type Err = PipelineError;

    /// Accepts `now` (any case) or a `YYYY-MM-DD` date.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("now") {
            return Ok(ObservationTimestamp::Now);
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(ObservationTimestamp::Fixed)
            .map_err(|e| {
                PipelineError::InvalidInput(format!(
                    "observation date must be 'now' or YYYY-MM-DD, got '{s}': {e}"
                ))
            })
    }
}

/// Which rows the bundle converter receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConversionInput {
    /// Every input row, valid or not.
    #[default]
    Raw,
    /// Only rows that pass the row validator.
    ValidOnly,
}

/// Pipeline configuration resolved at startup.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    scorer: ScorerConfig,
    observation_timestamp: ObservationTimestamp,
    document_format: DocumentFormat,
    conversion_input: ConversionInput,
}

impl PipelineConfig {
    pub fn new(
        scorer: ScorerConfig,
        observation_timestamp: ObservationTimestamp,
        document_format: DocumentFormat,
        conversion_input: ConversionInput,
    ) -> Self {
        Self {
            scorer,
            observation_timestamp,
            document_format,
            conversion_input,
        }
    }

    pub fn scorer(&self) -> &ScorerConfig {
        &self.scorer
    }

    pub fn observation_timestamp(&self) -> ObservationTimestamp {
        self.observation_timestamp
    }

    pub fn document_format(&self) -> DocumentFormat {
        self.document_format
    }

    pub fn conversion_input(&self) -> ConversionInput {
        self.conversion_input
    }
}

/// Parse an observation timestamp policy from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the fixed default date.
pub fn observation_timestamp_from_env_value(
    value: Option<String>,
) -> PipelineResult<ObservationTimestamp> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<ObservationTimestamp>()).transpose()?;

    Ok(parsed.unwrap_or_default())
}

/// Parse a contamination fraction from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default.
pub fn contamination_from_env_value(value: Option<String>) -> PipelineResult<f64> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(DEFAULT_CONTAMINATION),
        Some(v) => v.parse::<f64>().map_err(|e| {
            PipelineError::InvalidInput(format!("contamination '{v}' is not a number: {e}"))
        }),
    }
}
