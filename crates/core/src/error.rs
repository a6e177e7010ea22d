/// Fatal pipeline errors.
///
/// Per-row field violations are not errors in this sense: they are routed to the
/// invalid sink as [`crate::validation::FieldViolation`] values. Anything here
/// aborts the run before any artifact is committed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("input dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("input dataset contains no rows")]
    EmptyDataset,
    #[error("duplicate patient_id '{patient_id}' at data rows {first} and {second}")]
    DuplicatePatientId {
        patient_id: String,
        first: usize,
        second: usize,
    },
    #[error("failed to read input dataset: {0}")]
    FileRead(std::io::Error),
    #[error("failed to parse input dataset: {0}")]
    CsvRead(csv::Error),
    #[error("failed to write records: {0}")]
    CsvWrite(csv::Error),
    #[error("failed to create output directory: {0}")]
    OutputDirCreation(std::io::Error),
    #[error("failed to write output file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to commit output file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("failed to serialise clinical document: {0}")]
    Document(#[from] fhir::FhirError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
