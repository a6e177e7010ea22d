use clap::{Args, Parser, Subcommand};
use emr_core::constants::{DEFAULT_CONTAMINATION, DEFAULT_MAX_SAMPLES, DEFAULT_SEED, DEFAULT_TREES};
use emr_core::{
    sink, ConversionInput, Dataset, DiagnosisExtractor, ObservationTimestamp, OutputPaths,
    Pipeline, PipelineConfig, ScorerConfig,
};
use emr_extractor::{ExtractorConfig, LlmExtractor};
use fhir::{
    Bundle, BundleData, DocumentFormat, BLOOD_PRESSURE_PANEL_CODE, DIASTOLIC_CODE,
    HEART_RATE_CODE, SYSTOLIC_CODE,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "emr")]
#[command(about = "EMR validation, anomaly scoring and bundle conversion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score and validate a dataset, writing the valid and invalid record tables
    Validate {
        /// Input CSV dataset
        input: PathBuf,
        /// Directory for the record tables
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        #[command(flatten)]
        scorer: ScorerArgs,
    },
    /// Print the anomaly annotation for every row
    Score {
        /// Input CSV dataset
        input: PathBuf,
        #[command(flatten)]
        scorer: ScorerArgs,
    },
    /// Convert a dataset into a clinical document
    Convert {
        /// Input CSV dataset
        input: PathBuf,
        /// Output document path (defaults to bundle.<format> in the current directory)
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Run every pass and write all artifacts
    Run {
        /// Input CSV dataset
        input: PathBuf,
        /// Directory for all artifacts
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        #[command(flatten)]
        scorer: ScorerArgs,
        #[command(flatten)]
        document: DocumentArgs,
        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Summarise each patient in a clinical document
    Inspect {
        /// Document path
        bundle: PathBuf,
        /// Document format (json or yaml); inferred from the extension if omitted
        #[arg(long)]
        format: Option<DocumentFormat>,
    },
}

#[derive(Args)]
struct ScorerArgs {
    /// Expected outlier fraction, in (0, 0.5]
    #[arg(long, default_value_t = DEFAULT_CONTAMINATION)]
    contamination: f64,
    /// Random seed for the isolation forest
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,
    /// Number of isolation trees
    #[arg(long, default_value_t = DEFAULT_TREES)]
    trees: usize,
    /// Maximum rows sampled per tree
    #[arg(long, default_value_t = DEFAULT_MAX_SAMPLES)]
    max_samples: usize,
}

impl ScorerArgs {
    fn config(&self) -> anyhow::Result<ScorerConfig> {
        Ok(ScorerConfig::new(
            self.contamination,
            self.seed,
            self.trees,
            self.max_samples,
        )?)
    }
}

#[derive(Args)]
struct DocumentArgs {
    /// Document format: json or yaml
    #[arg(long, default_value = "json")]
    format: DocumentFormat,
    /// Observation effective date: YYYY-MM-DD or "now"
    #[arg(long, default_value = "2023-10-27")]
    observation_date: ObservationTimestamp,
    /// Convert only rows that pass validation
    #[arg(long)]
    valid_only: bool,
}

impl DocumentArgs {
    fn conversion_input(&self) -> ConversionInput {
        if self.valid_only {
            ConversionInput::ValidOnly
        } else {
            ConversionInput::Raw
        }
    }
}

#[derive(Args)]
struct LlmArgs {
    /// Base URL of an OpenAI-compatible endpoint; extraction is skipped if omitted
    #[arg(long)]
    llm_base_url: Option<String>,
    /// Model name sent with each completion request
    #[arg(long, default_value = "llama3")]
    llm_model: String,
    /// Bearer token for the endpoint (optional)
    #[arg(long)]
    llm_api_key: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    llm_timeout_secs: u64,
}

impl LlmArgs {
    fn extractor(&self) -> anyhow::Result<Option<LlmExtractor>> {
        let Some(base_url) = &self.llm_base_url else {
            return Ok(None);
        };
        let config = ExtractorConfig::new(base_url.as_str(), self.llm_model.as_str())?
            .with_api_key(self.llm_api_key.clone())
            .with_timeout(Duration::from_secs(self.llm_timeout_secs));
        Ok(Some(LlmExtractor::new(config)?))
    }
}

fn pipeline<'a>(config: PipelineConfig, extractor: Option<&'a LlmExtractor>) -> Pipeline<'a> {
    let pipeline = Pipeline::new(config);
    match extractor {
        Some(extractor) => pipeline.with_extractor(extractor as &dyn DiagnosisExtractor),
        None => pipeline,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("emr_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            input,
            output_dir,
            scorer,
        } => {
            let dataset = Dataset::from_path(&input)?;
            let config = PipelineConfig::new(
                scorer.config()?,
                ObservationTimestamp::default(),
                DocumentFormat::default(),
                ConversionInput::default(),
            );
            let outcome = Pipeline::new(config).validate(&dataset)?;

            let paths = OutputPaths::in_dir(&output_dir, DocumentFormat::default());
            sink::write_valid_records(&paths.valid, &outcome.valid)?;
            sink::write_invalid_records(&paths.invalid, &outcome.invalid)?;

            println!(
                "{} rows: {} valid, {} invalid",
                outcome.total(),
                outcome.valid.len(),
                outcome.invalid.len()
            );
            for invalid in &outcome.invalid {
                println!("  {}: {}", invalid.row.patient_id, invalid.error);
            }
        }
        Commands::Score { input, scorer } => {
            let dataset = Dataset::from_path(&input)?;
            let config = PipelineConfig::new(
                scorer.config()?,
                ObservationTimestamp::default(),
                DocumentFormat::default(),
                ConversionInput::default(),
            );
            let annotations = Pipeline::new(config).score(&dataset);
            for (row, annotation) in dataset.rows().iter().zip(&annotations) {
                println!(
                    "{}\t{:.6}\t{}",
                    row.patient_id,
                    annotation.score,
                    annotation.status.as_str()
                );
            }
        }
        Commands::Convert {
            input,
            output,
            document,
            llm,
        } => {
            let dataset = Dataset::from_path(&input)?;
            let extractor = llm.extractor()?;
            let config = PipelineConfig::new(
                ScorerConfig::default(),
                document.observation_date,
                document.format,
                document.conversion_input(),
            );
            let bundle = pipeline(config, extractor.as_ref()).convert(&dataset);

            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("bundle.{}", document.format.extension()))
            });
            sink::write_document(&output, &bundle, document.format)?;
            println!(
                "Wrote {} entries ({} conditions) to {}",
                bundle.len(),
                bundle.conditions().count(),
                output.display()
            );
        }
        Commands::Run {
            input,
            output_dir,
            scorer,
            document,
            llm,
        } => {
            let dataset = Dataset::from_path(&input)?;
            let extractor = llm.extractor()?;
            let config = PipelineConfig::new(
                scorer.config()?,
                document.observation_date,
                document.format,
                document.conversion_input(),
            );
            let summary = pipeline(config, extractor.as_ref()).run(&dataset, &output_dir)?;
            println!("{summary}");
        }
        Commands::Inspect { bundle, format } => {
            let format = match format {
                Some(format) => format,
                None => match bundle.extension().and_then(|e| e.to_str()) {
                    Some(ext) => ext.parse()?,
                    None => DocumentFormat::default(),
                },
            };
            let text = std::fs::read_to_string(&bundle)?;
            let data = Bundle::parse(&text, format)?;
            print_summary(&data);
        }
    }

    Ok(())
}

fn print_summary(bundle: &BundleData) {
    let patients: Vec<_> = bundle.patients().collect();
    if patients.is_empty() {
        println!("No patients found.");
        return;
    }

    for patient in patients {
        let heart_rate = bundle
            .observation_for(&patient.id, HEART_RATE_CODE)
            .and_then(|o| o.value.as_ref())
            .map(|q| format!("{} {}", q.value, q.unit))
            .unwrap_or_else(|| "-".into());

        let blood_pressure = bundle
            .observation_for(&patient.id, BLOOD_PRESSURE_PANEL_CODE)
            .map(|o| {
                let part = |code| {
                    o.component(code)
                        .and_then(|c| c.value.as_ref())
                        .map(|q| q.value.to_string())
                        .unwrap_or_else(|| "?".into())
                };
                format!("{}/{} mmHg", part(SYSTOLIC_CODE), part(DIASTOLIC_CODE))
            })
            .unwrap_or_else(|| "-".into());

        let conditions: Vec<_> = bundle
            .conditions_for(&patient.id)
            .map(|c| c.code.display.clone().unwrap_or_else(|| c.code.code.clone()))
            .collect();

        println!(
            "ID: {}, Name: {}, HR: {}, BP: {}, Conditions: {}",
            patient.id,
            patient.name.as_deref().unwrap_or("-"),
            heart_rate,
            blood_pressure,
            if conditions.is_empty() {
                "-".to_string()
            } else {
                conditions.join(", ")
            }
        );
    }
}
