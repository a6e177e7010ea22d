//! Diagnosis extraction port.
//!
//! The converter depends on this trait only; the HTTP adapter lives in the
//! `emr-extractor` crate and tests substitute closures or canned fakes.

use crate::constants::{EXTRACTION_FAILED, NO_DIAGNOSIS_FOUND};

/// Outcome of one extraction call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// A normalised, non-empty diagnosis label.
    Diagnosis(String),
    /// The note names no diagnosis.
    NotFound,
    /// The adapter could not produce an answer. Carries the cause for logging.
    Failed(String),
}

impl Extraction {
    /// Interpret a raw adapter label.
    ///
    /// Surrounding whitespace and quote characters are stripped. The two sentinel
    /// labels and an empty label do not produce a diagnosis.
    pub fn from_label(label: &str) -> Self {
        let label = label
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’'))
            .trim();

        if label.is_empty() || label.eq_ignore_ascii_case(NO_DIAGNOSIS_FOUND) {
            Extraction::NotFound
        } else if label.eq_ignore_ascii_case(EXTRACTION_FAILED) {
            Extraction::Failed(EXTRACTION_FAILED.to_string())
        } else {
            Extraction::Diagnosis(label.to_string())
        }
    }

    /// The label form of this outcome, sentinels included.
    pub fn as_label(&self) -> &str {
        match self {
            Extraction::Diagnosis(label) => label,
            Extraction::NotFound => NO_DIAGNOSIS_FOUND,
            Extraction::Failed(_) => EXTRACTION_FAILED,
        }
    }

    pub fn diagnosis(&self) -> Option<&str> {
        match self {
            Extraction::Diagnosis(label) => Some(label),
            _ => None,
        }
    }
}

/// Free text to primary diagnosis.
///
/// Implementations must not panic or propagate faults: any failure is reported as
/// [`Extraction::Failed`].
pub trait DiagnosisExtractor {
    fn extract(&self, note: &str) -> Extraction;
}

impl<F> DiagnosisExtractor for F
where
    F: Fn(&str) -> Extraction,
{
    fn extract(&self, note: &str) -> Extraction {
        self(note)
    }
}

/// Whether a note should be sent to the extractor at all.
///
/// Blank notes and notes that are themselves a sentinel label are skipped.
pub fn should_extract(note: &str) -> bool {
    let note = note.trim();
    !(note.is_empty()
        || note.eq_ignore_ascii_case(NO_DIAGNOSIS_FOUND)
        || note.eq_ignore_ascii_case(EXTRACTION_FAILED))
}
