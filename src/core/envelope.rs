//! The uniform response envelope returned by every operation (spec §3, C1).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::UnityToolError;

/// Closed severity taxonomy. Ordering matters: `>=` comparisons below rely
/// on the declaration order (info < warning < error < critical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// `severity ∈ {error, critical} ⇒ success == false` (spec §8).
    pub fn is_failure(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// One finding surfaced by a scan/validation/apply stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Closed-registry code token (spec §6), e.g. `REF001`, `PVR001`. Empty
    /// for findings with no registered code (plain `where-used` usages).
    #[serde(default)]
    pub code: String,
    /// File-relative property path, or a `file:line` location string.
    pub path: String,
    pub location: String,
    pub detail: String,
    /// The literal text that triggered the finding (a `guid:`/`fileID:` line, etc.)
    pub evidence: String,
}

impl Diagnostic {
    pub fn new(
        code: impl Into<String>,
        path: impl Into<String>,
        location: impl Into<String>,
        detail: impl Into<String>,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            path: path.into(),
            location: location.into(),
            detail: detail.into(),
            evidence: evidence.into(),
        }
    }
}

/// `{success, severity, code, message, data, diagnostics[]}` — returned by
/// every core operation and every CLI verb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default = "serde_json::Value::default")]
    pub data: serde_json::Value,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Envelope {
    pub fn ok(code: impl Into<String>, message: impl Into<String>, data: serde_json::Value) -> Self {
        Envelope {
            success: true,
            severity: Severity::Info,
            code: code.into(),
            message: message.into(),
            data,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_severity(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Envelope {
            success: !severity.is_failure(),
            severity,
            code: code.into(),
            message: message.into(),
            data,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Every `UnityToolError` that carries a registry code becomes a
    /// `severity: error` envelope with `success: false` (uncoded wrapper
    /// errors fall back to a generic `INTERNAL` code).
    pub fn from_error(err: &UnityToolError) -> Self {
        let code = err.code().unwrap_or("INTERNAL");
        Envelope::with_severity(
            err.severity(),
            code,
            err.to_string(),
            serde_json::Value::Null,
        )
    }

    /// Process exit code: 0 on success, 1 on any `error`/`critical` envelope.
    pub fn exit_code(&self) -> i32 {
        if self.severity.is_failure() { 1 } else { 0 }
    }
}
