//! Constants used throughout the EMR core crate.
//!
//! Column names, sentinels, artifact filenames and scorer defaults live here so the
//! dataset reader, the sinks and the converter agree on them.

/// Required input columns, in output order.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "patient_id",
    "name",
    "dob",
    "gender",
    "email",
    "diagnosis_code",
    "heart_rate",
    "blood_pressure_systolic",
    "blood_pressure_diastolic",
];

/// Optional free-text column.
pub const NOTES_COLUMN: &str = "notes";

/// Label returned by a diagnosis extractor when the note names no diagnosis.
pub const NO_DIAGNOSIS_FOUND: &str = "No Diagnosis Found";

/// Label recorded when the extractor call itself failed.
pub const EXTRACTION_FAILED: &str = "LLM Extraction Failed";

/// Inclusive heart-rate policy range, beats per minute.
pub const HEART_RATE_MIN: i64 = 30;
pub const HEART_RATE_MAX: i64 = 200;

/// Expected outlier fraction used when none is configured.
pub const DEFAULT_CONTAMINATION: f64 = 0.05;

/// Random seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// Number of isolation trees per fit.
pub const DEFAULT_TREES: usize = 100;

/// Maximum rows sub-sampled per isolation tree.
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Effective date stamped on every observation when the timestamp policy is fixed.
pub const DEFAULT_OBSERVATION_DATE: &str = "2023-10-27";

/// Reference kind used for subject references.
pub const PATIENT_REFERENCE_KIND: &str = "Patient";

/// Filename for the accepted-records artifact.
pub const VALID_RECORDS_FILENAME: &str = "valid_records.csv";

/// Filename for the rejected-records artifact.
pub const INVALID_RECORDS_FILENAME: &str = "invalid_records.csv";

/// Stem for the interchange document; the extension follows the document format.
pub const BUNDLE_FILE_STEM: &str = "bundle";
