//! Error types for the conflicter core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. The
//! collision check and the ask loop report through [`ConflicterError`];
//! configuration loading reports through [`ConfigError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::models::ConflictFile;

// ---------------------------------------------------------------------------
// Conflicter errors
// ---------------------------------------------------------------------------

/// Errors from conflict detection, interactive resolution and the pipeline.
#[derive(Debug, Error)]
pub enum ConflicterError {
    /// The user picked "abort" from the conflict menu.
    #[error("Process aborted by user")]
    AbortedByUser,

    /// Bail mode hit a conflicting or newly created file.
    #[error("Process aborted by conflict: {}", relative_path.display())]
    AbortedByConflict {
        relative_path: PathBuf,
        file: Box<ConflictFile>,
    },

    /// The ask loop re-prompted too many times for the same file.
    #[error("Recursive error {message}")]
    RecursiveAsk { message: String },

    /// The adapter was closed while a task was pending or running.
    #[error("adapter is closed")]
    AdapterClosed,

    /// The answer source had nothing to say for a question.
    #[error("question '{0}' was asked but no answer was provided")]
    MissingAnswer(String),

    /// The answer source returned an answer of the wrong shape.
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// Disk access failed while inspecting an existing file.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConflicterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The file carried by a bail abort, if any.
    pub fn file(&self) -> Option<&ConflictFile> {
        match self {
            Self::AbortedByConflict { file, .. } => Some(file),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
