//! Output sinks.
//!
//! Every artifact is serialised into a temporary file in its destination directory
//! and renamed into place only once complete, so a crash never leaves a partial
//! file under the final name.
//!
//! A multi-artifact run stages every file first and calls [`commit`] only when
//! all of them were written; a failed stage drops the earlier temp files and
//! leaves the destination untouched.

use crate::constants::REQUIRED_COLUMNS;
use crate::record::{InvalidRecord, ValidatedRecord};
use crate::{PipelineError, PipelineResult};
use fhir::{Bundle, BundleData, DocumentFormat};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const ANNOTATION_COLUMNS: [&str; 2] = ["anomaly_score", "anomaly_status"];

#[derive(Serialize)]
struct ValidRow<'a> {
    patient_id: &'a str,
    name: &'a str,
    dob: String,
    gender: &'a str,
    email: &'a str,
    diagnosis_code: &'a str,
    heart_rate: i64,
    blood_pressure_systolic: i64,
    blood_pressure_diastolic: i64,
    notes: &'a str,
    anomaly_score: f64,
    anomaly_status: &'a str,
}

impl<'a> From<&'a ValidatedRecord> for ValidRow<'a> {
    fn from(r: &'a ValidatedRecord) -> Self {
        Self {
            patient_id: r.patient_id.as_str(),
            name: r.name.as_str(),
            dob: r.dob.format("%Y-%m-%d").to_string(),
            gender: r.gender.as_str(),
            email: r.email.as_str(),
            diagnosis_code: r.diagnosis_code.as_str(),
            heart_rate: r.heart_rate,
            blood_pressure_systolic: r.blood_pressure_systolic,
            blood_pressure_diastolic: r.blood_pressure_diastolic,
            notes: r.notes.as_deref().unwrap_or(""),
            anomaly_score: r.anomaly.score,
            anomaly_status: r.anomaly.status.as_str(),
        }
    }
}

#[derive(Serialize)]
struct InvalidRow<'a> {
    patient_id: &'a str,
    name: &'a str,
    dob: &'a str,
    gender: &'a str,
    email: &'a str,
    diagnosis_code: &'a str,
    heart_rate: &'a str,
    blood_pressure_systolic: &'a str,
    blood_pressure_diastolic: &'a str,
    notes: &'a str,
    anomaly_score: f64,
    anomaly_status: &'a str,
    error: &'a str,
}

impl<'a> From<&'a InvalidRecord> for InvalidRow<'a> {
    fn from(r: &'a InvalidRecord) -> Self {
        Self {
            patient_id: &r.row.patient_id,
            name: &r.row.name,
            dob: &r.row.dob,
            gender: &r.row.gender,
            email: &r.row.email,
            diagnosis_code: &r.row.diagnosis_code,
            heart_rate: &r.row.heart_rate,
            blood_pressure_systolic: &r.row.blood_pressure_systolic,
            blood_pressure_diastolic: &r.row.blood_pressure_diastolic,
            notes: r.row.notes.as_deref().unwrap_or(""),
            anomaly_score: r.anomaly.score,
            anomaly_status: r.anomaly.status.as_str(),
            error: &r.error,
        }
    }
}

fn header(extra: &[&'static str]) -> Vec<&'static str> {
    REQUIRED_COLUMNS
        .iter()
        .copied()
        .chain(std::iter::once(crate::constants::NOTES_COLUMN))
        .chain(ANNOTATION_COLUMNS)
        .chain(extra.iter().copied())
        .collect()
}

/// A fully written and synced artifact, not yet renamed onto its final path.
///
/// Dropping it removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
    path: PathBuf,
}

impl StagedFile {
    /// Final destination of this artifact.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Rename staged artifacts into place, in order.
pub fn commit(staged: Vec<StagedFile>) -> PipelineResult<()> {
    for StagedFile { file, path } in staged {
        file.persist(&path)?;
        tracing::debug!(path = %path.display(), "committed artifact");
    }
    Ok(())
}

/// Stage the accepted-records table.
///
/// The header is written even when there are no records.
pub fn stage_valid_records(path: &Path, records: &[ValidatedRecord]) -> PipelineResult<StagedFile> {
    let staged = stage_csv(path, &header(&[]), records.iter().map(ValidRow::from))?;
    tracing::info!(path = %path.display(), rows = records.len(), "staged valid records");
    Ok(staged)
}

/// Stage the rejected-records table: original cells, annotation, and `error`.
pub fn stage_invalid_records(path: &Path, records: &[InvalidRecord]) -> PipelineResult<StagedFile> {
    let staged = stage_csv(path, &header(&["error"]), records.iter().map(InvalidRow::from))?;
    tracing::info!(path = %path.display(), rows = records.len(), "staged invalid records");
    Ok(staged)
}

/// Stage already-rendered text.
pub fn stage_text(path: &Path, text: &str) -> PipelineResult<StagedFile> {
    stage(path, |file| {
        file.write_all(text.as_bytes())
            .map_err(PipelineError::FileWrite)
    })
}

/// Write the accepted-records table.
pub fn write_valid_records(path: &Path, records: &[ValidatedRecord]) -> PipelineResult<()> {
    commit(vec![stage_valid_records(path, records)?])
}

/// Write the rejected-records table.
pub fn write_invalid_records(path: &Path, records: &[InvalidRecord]) -> PipelineResult<()> {
    commit(vec![stage_invalid_records(path, records)?])
}

/// Render and write an interchange document.
pub fn write_document(path: &Path, bundle: &BundleData, format: DocumentFormat) -> PipelineResult<()> {
    let text = Bundle::render(bundle, format)?;
    write_text(path, &text)?;
    tracing::info!(path = %path.display(), entries = bundle.len(), "wrote clinical document");
    Ok(())
}

/// Atomically replace `path` with `text`.
pub fn write_text(path: &Path, text: &str) -> PipelineResult<()> {
    commit(vec![stage_text(path, text)?])
}

fn stage_csv<S, I>(path: &Path, header: &[&str], rows: I) -> PipelineResult<StagedFile>
where
    S: Serialize,
    I: IntoIterator<Item = S>,
{
    stage(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer
            .write_record(header)
            .map_err(PipelineError::CsvWrite)?;
        for row in rows {
            writer.serialize(row).map_err(PipelineError::CsvWrite)?;
        }
        writer.flush().map_err(PipelineError::FileWrite)
    })
}

fn stage<F>(path: &Path, write: F) -> PipelineResult<StagedFile>
where
    F: FnOnce(&mut NamedTempFile) -> PipelineResult<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(PipelineError::OutputDirCreation)?;

    let mut file = NamedTempFile::new_in(dir).map_err(PipelineError::FileWrite)?;
    write(&mut file)?;
    file.as_file()
        .sync_all()
        .map_err(PipelineError::FileWrite)?;
    Ok(StagedFile {
        file,
        path: path.to_path_buf(),
    })
}
