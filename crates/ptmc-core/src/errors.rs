//! Structured error types shared across ptmc crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`PtError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (ranks, sizes, paths, etc.).
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

/// Canonical error type for the replica-exchange engine.
///
/// Every variant is fatal for the run it occurs in. A rejected Metropolis swap
/// is a normal outcome and never surfaces as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum PtError {
    /// Invalid run parameters, rejected before the first iteration.
    #[error("configuration error: {0}")]
    Config(ErrorInfo),
    /// Broken exchange protocol invariant (double assignment, short gather, size mismatch).
    #[error("protocol invariant violation: {0}")]
    Protocol(ErrorInfo),
    /// Participant unreachable, disconnected or stalled past the liveness timeout.
    #[error("transport failure: {0}")]
    Transport(ErrorInfo),
    /// Failure reported by the Monte Carlo walker.
    #[error("walker error: {0}")]
    Walker(ErrorInfo),
    /// Serialization, schema and artifact I/O errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
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

impl PtError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            PtError::Config(info)
            | PtError::Protocol(info)
            | PtError::Transport(info)
            | PtError::Walker(info)
            | PtError::Serde(info) => info,
        }
    }

    /// Wraps an I/O failure on `path` into a [`PtError::Serde`] with a stable code.
    pub fn io(code: &str, err: std::io::Error, path: &std::path::Path) -> Self {
        PtError::Serde(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
