//! Structured error types shared across MEC crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`MecError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message naming the violated rule.
    pub message: String,
    /// Contextual key value pairs (paths, counts, tokens, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the MEC plan compiler.
///
/// Every variant is raised synchronously, before any plan stage is emitted;
/// a compile call either returns a complete plan or one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum MecError {
    /// A required dataset or anatomical file is absent.
    #[error("missing input: {0}")]
    MissingInput(ErrorInfo),
    /// A dataset specification or echo-time list could not be resolved.
    #[error("invalid specification: {0}")]
    InvalidSpecification(ErrorInfo),
    /// A legal-on-their-own pair of options cannot be combined.
    #[error("conflicting options: {0}")]
    ConflictingOptions(ErrorInfo),
    /// The external toolkit environment is not configured.
    #[error("environment not ready: {0}")]
    EnvironmentNotReady(ErrorInfo),
    /// Volume geometry could not be read or derived.
    #[error("geometry error: {0}")]
    Geometry(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Internal invariant violations; seeing one is a bug.
    #[error("internal error: {0}")]
    Internal(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl MecError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            MecError::MissingInput(info)
            | MecError::InvalidSpecification(info)
            | MecError::ConflictingOptions(info)
            | MecError::EnvironmentNotReady(info)
            | MecError::Geometry(info)
            | MecError::Serde(info)
            | MecError::Internal(info) => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_round_trip_through_serde() {
        let err = MecError::InvalidSpecification(
            ErrorInfo::new("echo_count_mismatch", "counts differ")
                .with_context("echo_times", "3")
                .with_context("datasets", "2"),
        );
        let bytes = serde_json::to_vec(&err).expect("serialize");
        let restored: MecError = serde_json::from_slice(&bytes).expect("deserialize");
        assert_eq!(err, restored);
    }

    #[test]
    fn display_includes_code_context_and_hint() {
        let err = MecError::ConflictingOptions(
            ErrorInfo::new("run_dir_exists", "a run directory already exists")
                .with_context("directory", "mec.sub01e123")
                .with_hint("pass --OVERWRITE to replace it"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("run_dir_exists"));
        assert!(rendered.contains("mec.sub01e123"));
        assert!(rendered.contains("--OVERWRITE"));
    }
}
