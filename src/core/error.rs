//! Error types for unitytool operations.
//!
//! This module defines the canonical error type used throughout unitytool.
//! All subsystems return `Result<T, UnityToolError>`. Every variant maps to
//! exactly one token in the closed error-code registry (spec §6) via
//! [`UnityToolError::code`], so the orchestrator never has to re-derive a
//! code from a message string.

use std::io;
use thiserror::Error;

use crate::core::envelope::Severity;

/// Canonical error type for all unitytool operations.
#[derive(Error, Debug)]
pub enum UnityToolError {
    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed JSON document (plan, attestation, bridge response, ignore file)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed TOML config
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid regex pattern supplied by a caller (e.g. exclude glob compiled as regex)
    #[error("pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// No ancestor directory containing `Assets/` was found for the scope path.
    #[error("no project root found above '{0}'")]
    NoProjectRoot(String),

    /// Plan/ignore-file/bridge-response schema violation.
    #[error("schema error ({code}): {message}")]
    Schema { code: &'static str, message: String },

    /// Reference-integrity or override-staleness finding that must stop the pipeline.
    #[error("integrity error ({code}): {message}")]
    Integrity { code: &'static str, message: String },

    /// Plan digest/signature/attestation mismatch.
    #[error("{code}: {message}")]
    CryptoMismatch { code: &'static str, message: String },

    /// Confirm flag missing, unsupported target, or non-allowlisted command.
    #[error("{code}: {message}")]
    Policy { code: &'static str, message: String },

    /// Bridge process failed to start, timed out, or returned a malformed envelope.
    #[error("{code}: {message}")]
    Process { code: &'static str, message: String },

    /// Caller-supplied cancellation signal fired mid-operation.
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl UnityToolError {
    /// The closed-registry code token for this error (spec §6), or `None`
    /// for errors that never reach a CLI boundary as a coded envelope
    /// (bare I/O/JSON/TOML/regex failures, which are wrapped by callers
    /// before that point).
    pub fn code(&self) -> Option<&'static str> {
        match self {
            UnityToolError::NoProjectRoot(_) => Some("REF_NO_PROJECT_ROOT"),
            UnityToolError::Schema { code, .. } => Some(code),
            UnityToolError::Integrity { code, .. } => Some(code),
            UnityToolError::CryptoMismatch { code, .. } => Some(code),
            UnityToolError::Policy { code, .. } => Some(code),
            UnityToolError::Process { code, .. } => Some(code),
            UnityToolError::Cancelled(_) => Some("OP_CANCELLED"),
            _ => None,
        }
    }

    /// Severity this error should be reported at. Always `error` or
    /// `critical` — `UnityToolError` is only ever constructed for failure
    /// paths; `warning`/`info` flow through `Envelope` directly instead.
    pub fn severity(&self) -> Severity {
        Severity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_project_root_maps_to_registry_code() {
        let err = UnityToolError::NoProjectRoot("/tmp/scope".to_string());
        assert_eq!(err.code(), Some("REF_NO_PROJECT_ROOT"));
    }

    #[test]
    fn schema_error_carries_its_own_code() {
        let err = UnityToolError::Schema {
            code: "SER002",
            message: "missing target".to_string(),
        };
        assert_eq!(err.code(), Some("SER002"));
        assert!(format!("{err}").contains("SER002"));
    }

    #[test]
    fn bare_io_error_has_no_registry_code() {
        let err = UnityToolError::Io(io::Error::new(io::ErrorKind::NotFound, "nope"));
        assert_eq!(err.code(), None);
    }
}
