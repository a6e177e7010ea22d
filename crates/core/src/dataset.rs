//! Input dataset loading.
//!
//! The dataset is delimited text with a header row naming the columns in
//! [`REQUIRED_COLUMNS`](crate::constants::REQUIRED_COLUMNS), plus an optional
//! `notes` column. Structural problems (missing columns, ragged rows, duplicate
//! subjects) are fatal; cell-level problems are left for the validator.

use crate::constants::REQUIRED_COLUMNS;
use crate::record::TabularRow;
use crate::{PipelineError, PipelineResult};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// An in-memory batch of rows, immutable once loaded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<TabularRow>,
}

impl Dataset {
    /// Wrap rows that were produced in memory.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::DuplicatePatientId` if two rows share a `patient_id`.
    pub fn from_rows(rows: Vec<TabularRow>) -> PipelineResult<Self> {
        check_unique_patient_ids(&rows)?;
        Ok(Self { rows })
    }

    /// Read a comma-separated dataset from disk.
    pub fn from_path(path: &Path) -> PipelineResult<Self> {
        let file = fs::File::open(path).map_err(PipelineError::FileRead)?;
        let dataset = Self::from_reader(io::BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            rows = dataset.len(),
            "loaded input dataset"
        );
        Ok(dataset)
    }

    /// Read a comma-separated dataset.
    ///
    /// # Errors
    ///
    /// - `MissingColumns` if the header lacks any required column
    /// - `CsvRead` for malformed CSV (including rows with the wrong number of cells)
    /// - `DuplicatePatientId` if two rows share a `patient_id`
    pub fn from_reader<R: io::Read>(reader: R) -> PipelineResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers().map_err(PipelineError::CsvRead)?.clone();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| !headers.iter().any(|h| h == **column))
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingColumns(missing));
        }

        let rows = reader
            .deserialize::<TabularRow>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(PipelineError::CsvRead)?;

        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[TabularRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Blank ids are left for the validator to reject; only repeated non-blank ids are fatal.
fn check_unique_patient_ids(rows: &[TabularRow]) -> PipelineResult<()> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let id = row.patient_id.trim();
        if id.is_empty() {
            continue;
        }
        if let Some(first) = seen.insert(id, index + 1) {
            return Err(PipelineError::DuplicatePatientId {
                patient_id: id.to_string(),
                first,
                second: index + 1,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "patient_id,name,dob,gender,email,diagnosis_code,heart_rate,blood_pressure_systolic,blood_pressure_diastolic,notes";

    #[test]
    fn reads_rows_with_optional_notes() {
        let csv = format!(
            "{HEADER}\nP1,Ada Lovelace,1990-01-01,Female,ada@example.com,I10,72,120,80,persistent cough\nP2,Alan Turing,1985-06-23,Male,alan@example.com,E11,88,130,85,\n"
        );
        let dataset = Dataset::from_reader(csv.as_bytes()).expect("should load");
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0].notes.as_deref(), Some("persistent cough"));
        assert_eq!(dataset.rows()[1].notes, None);
        assert_eq!(dataset.rows()[1].heart_rate, "88");
    }

    #[test]
    fn notes_column_may_be_absent() {
        let header = HEADER.trim_end_matches(",notes");
        let csv = format!("{header}\nP1,Ada,1990-01-01,Female,ada@example.com,I10,72,120,80\n");
        let dataset = Dataset::from_reader(csv.as_bytes()).expect("should load");
        assert_eq!(dataset.rows()[0].notes, None);
    }

    #[test]
    fn missing_columns_are_fatal_and_named() {
        let csv = "patient_id,name,dob,gender,email\nP1,Ada,1990-01-01,Female,ada@example.com\n";
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("should reject");
        match err {
            PipelineError::MissingColumns(missing) => {
                assert_eq!(
                    missing,
                    vec![
                        "diagnosis_code",
                        "heart_rate",
                        "blood_pressure_systolic",
                        "blood_pressure_diastolic"
                    ]
                );
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn ragged_rows_are_fatal() {
        let csv = format!("{HEADER}\nP1,Ada,1990-01-01\n");
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("should reject");
        assert!(matches!(err, PipelineError::CsvRead(_)));
    }

    #[test]
    fn duplicate_patient_ids_are_fatal() {
        let csv = format!(
            "{HEADER}\nP1,Ada,1990-01-01,Female,ada@example.com,I10,72,120,80,\nP1,Ada,1990-01-01,Female,ada@example.com,I10,72,120,80,\n"
        );
        let err = Dataset::from_reader(csv.as_bytes()).expect_err("should reject");
        assert!(matches!(
            err,
            PipelineError::DuplicatePatientId { ref patient_id, first: 1, second: 2 } if patient_id == "P1"
        ));
    }

    #[test]
    fn header_only_file_is_an_empty_dataset() {
        let dataset = Dataset::from_reader(format!("{HEADER}\n").as_bytes()).expect("should load");
        assert!(dataset.is_empty());
    }

    #[test]
    fn from_path_reports_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let err = Dataset::from_path(&temp_dir.path().join("absent.csv")).expect_err("no file");
        assert!(matches!(err, PipelineError::FileRead(_)));
    }
}
