//! Validated primitive types shared across the EMR pipeline crates.
//!
//! Each type guarantees its invariant once constructed, so downstream code can
//! accept it without re-checking:
//! - [`NonEmptyText`]: trimmed, never empty
//! - [`DiagnosisCode`]: one uppercase ASCII letter followed by exactly two digits
//! - [`EmailAddress`]: a syntactically valid `local@domain.tld` address
//! - [`Gender`]: the closed set `Male`, `Female`, `Other`

use std::sync::LazyLock;

use regex::Regex;

/// Errors that can occur when creating validated text types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    #[error("'{0}' does not match pattern [A-Z][0-9]{{2}}")]
    DiagnosisCodePattern(String),

    #[error("'{0}' is not a valid email address")]
    Email(String),

    #[error("'{0}' is not one of Male, Female, Other")]
    Gender(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An ICD-10-shaped diagnosis code such as `I10` or `E11`.
///
/// Only the three-character category form is accepted. The input is not trimmed
/// or case-folded: `i10` and ` I10` are both rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosisCode(String);

impl DiagnosisCode {
    /// Parse a diagnosis code.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::DiagnosisCodePattern`] unless the input is exactly one
    /// uppercase ASCII letter followed by two ASCII digits.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let ok = matches!(
            input.as_bytes(),
            [b'A'..=b'Z', b'0'..=b'9', b'0'..=b'9']
        );
        if !ok {
            return Err(TextError::DiagnosisCodePattern(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // local part: dot-separated RFC 5322 atoms; domain: dot-separated LDH labels, alphabetic TLD.
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
    )
    .expect("email regex is valid")
});

/// A syntactically valid email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Parse an email address.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Email`] if the address is not `local@domain.tld` shaped.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        if input.len() > 254 || !EMAIL_RE.is_match(input) {
            return Err(TextError::Email(input.to_owned()));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Administrative gender as recorded in the source dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Parse from the dataset spelling (case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Gender`] for anything other than `Male`, `Female` or `Other`.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        match input {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            _ => Err(TextError::Gender(input.to_owned())),
        }
    }

    /// The dataset spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }

    /// Lower-case FHIR administrative gender code.
    pub fn to_wire(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

macro_rules! string_newtype_impls {
    ($ty:ident, $ctor:path) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $ctor(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_newtype_impls!(NonEmptyText, NonEmptyText::new);
string_newtype_impls!(DiagnosisCode, DiagnosisCode::parse);
string_newtype_impls!(EmailAddress, EmailAddress::parse);

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Gender {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for Gender {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Gender::parse(&s).map_err(serde::de::Error::custom)
    }
}
