//! Required-field validation shared by credentials and stack configs

use std::fmt;

use thiserror::Error;

/// A required field was absent or malformed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// What was being validated, e.g. "credentials config"
    pub subject: &'static str,
    /// Wire name of the offending field, e.g. "clientSecret"
    pub field: &'static str,
    /// Why a present value was rejected; `None` means the field is missing
    pub reason: Option<String>,
}

impl ValidationError {
    pub fn missing(subject: &'static str, field: &'static str) -> Self {
        Self {
            subject,
            field,
            reason: None,
        }
    }

    pub fn invalid(subject: &'static str, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            subject,
            field,
            reason: Some(reason.into()),
        }
    }

    /// Returns true if the field was absent rather than malformed
    pub fn is_missing(&self) -> bool {
        self.reason.is_none()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            None => write!(f, "could not find {} in {}", self.field, self.subject),
            Some(reason) => write!(f, "invalid {} in {}: {}", self.field, self.subject, reason),
        }
    }
}

/// Side-effect-free validation of a config value
pub trait Validate {
    /// Check required fields in declaration order and report the first problem
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Return the value of a required string field. Blank strings count as missing.
pub(crate) fn require<'a>(
    subject: &'static str,
    field: &'static str,
    value: Option<&'a String>,
) -> Result<&'a str, ValidationError> {
    match value.map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::missing(subject, field)),
    }
}
