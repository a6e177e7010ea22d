use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emr_core::config::{contamination_from_env_value, observation_timestamp_from_env_value};
use emr_core::constants::{DEFAULT_MAX_SAMPLES, DEFAULT_SEED, DEFAULT_TREES};
use emr_core::{
    ConversionInput, Dataset, DocumentFormat, Pipeline, PipelineConfig, ScorerConfig,
};
use emr_extractor::{ExtractorConfig, LlmExtractor};

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_LLM_MODEL: &str = "llama3";

/// Batch entry point for the EMR pipeline
///
/// Loads one dataset, runs scoring, validation and conversion, and commits the
/// three artifacts to the output directory.
///
/// # Environment Variables
/// - `EMR_INPUT`: input CSV dataset (required)
/// - `EMR_OUTPUT_DIR`: artifact directory (default: "output")
/// - `EMR_CONTAMINATION`: expected outlier fraction (default: 0.05)
/// - `EMR_SEED`: isolation forest seed (default: 42)
/// - `EMR_OBSERVATION_DATE`: `YYYY-MM-DD` or `now` (default: 2023-10-27)
/// - `EMR_DOCUMENT_FORMAT`: `json` or `yaml` (default: json)
/// - `EMR_CONVERT_VALID_ONLY`: `true` to convert only valid rows
/// - `EMR_LLM_BASE_URL`: OpenAI-compatible endpoint; extraction is skipped if unset
/// - `EMR_LLM_MODEL`: model name (default: "llama3")
/// - `EMR_LLM_API_KEY`: bearer token (optional)
/// - `EMR_LLM_TIMEOUT_SECS`: per-request timeout (default: 30)
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("emr_core=info".parse()?)
                .add_directive("emr_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let input: PathBuf = env_value("EMR_INPUT")
        .context("EMR_INPUT must point at the input dataset")?
        .into();
    let output_dir: PathBuf = env_value("EMR_OUTPUT_DIR")
        .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.into())
        .into();

    let seed = env_value("EMR_SEED")
        .map(|v| v.parse::<u64>())
        .transpose()
        .context("EMR_SEED must be an unsigned integer")?
        .unwrap_or(DEFAULT_SEED);
    let scorer = ScorerConfig::new(
        contamination_from_env_value(std::env::var("EMR_CONTAMINATION").ok())?,
        seed,
        DEFAULT_TREES,
        DEFAULT_MAX_SAMPLES,
    )?;

    let observation_timestamp =
        observation_timestamp_from_env_value(std::env::var("EMR_OBSERVATION_DATE").ok())?;
    let document_format = env_value("EMR_DOCUMENT_FORMAT")
        .map(|v| v.parse::<DocumentFormat>())
        .transpose()?
        .unwrap_or_default();
    let valid_only = env_value("EMR_CONVERT_VALID_ONLY").map(|v| v.to_ascii_lowercase());
    let conversion_input = match valid_only.as_deref() {
        Some("1" | "true" | "yes") => ConversionInput::ValidOnly,
        _ => ConversionInput::Raw,
    };

    let config = PipelineConfig::new(
        scorer,
        observation_timestamp,
        document_format,
        conversion_input,
    );

    let extractor = match env_value("EMR_LLM_BASE_URL") {
        Some(base_url) => {
            let timeout = env_value("EMR_LLM_TIMEOUT_SECS")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("EMR_LLM_TIMEOUT_SECS must be a whole number of seconds")?
                .map(Duration::from_secs)
                .unwrap_or(emr_extractor::DEFAULT_TIMEOUT);
            let model = env_value("EMR_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.into());
            let config = ExtractorConfig::new(base_url, model)?
                .with_api_key(env_value("EMR_LLM_API_KEY"))
                .with_timeout(timeout);
            tracing::info!(
                base_url = config.base_url(),
                model = config.model(),
                "++ Diagnosis extraction enabled"
            );
            Some(LlmExtractor::new(config)?)
        }
        None => {
            tracing::info!("++ EMR_LLM_BASE_URL not set; diagnosis extraction disabled");
            None
        }
    };

    tracing::info!("++ Starting EMR pipeline on {}", input.display());

    let dataset = Dataset::from_path(&input)?;
    let mut pipeline = Pipeline::new(config);
    if let Some(extractor) = &extractor {
        pipeline = pipeline.with_extractor(extractor);
    }
    let summary = pipeline.run(&dataset, &output_dir)?;

    tracing::info!("++ {summary}");
    Ok(())
}

/// Trimmed, non-empty value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
