//! Validation verdict for a fiscal record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of a single field check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckValue {
    Passed(bool),
    Count(usize),
}

impl From<bool> for CheckValue {
    fn from(value: bool) -> Self {
        CheckValue::Passed(value)
    }
}

impl From<usize> for CheckValue {
    fn from(value: usize) -> Self {
        CheckValue::Count(value)
    }
}

/// Validity verdict with categorized findings.
///
/// `is_valid` is false exactly when `errors` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub field_checks: BTreeMap<String, CheckValue>,
}

impl ValidationResult {
    /// Assemble a result, deriving `is_valid` from the error list.
    pub fn from_parts(
        errors: Vec<String>,
        warnings: Vec<String>,
        field_checks: BTreeMap<String, CheckValue>,
    ) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            field_checks,
        }
    }

    /// Number of errors and warnings combined.
    pub fn issue_count(&self) -> usize {
        self.errors.len() + self.warnings.len()
    }

    pub fn check(&self, name: &str) -> Option<CheckValue> {
        self.field_checks.get(name).copied()
    }
}
