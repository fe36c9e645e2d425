use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// High-level error type shared across unitscan components.
///
/// Only global safety violations and I/O failures that prevent the scan from
/// starting surface here; per-manifest and per-workspace problems are logged
/// and isolated by the component that hits them.
#[derive(Debug, Error)]
pub enum UnitscanError {
    #[error("unsafe matrix directory '{directory}': {reason}")]
    UnsafeMatrixDirectory {
        directory: String,
        reason: UnsafeReason,
    },
    #[error("non UTF-8 matrix directory: {0}")]
    NonUtf8Directory(PathBuf),
    #[error(
        "detected {found} Rust targets, exceeding CI_MAX_MATRIX_ENTRIES={limit}. \
         Set CI_MANIFEST_EXCLUDE_DIRS or CI_MAX_MATRIX_ENTRIES to tune detection."
    )]
    MatrixTooLarge { found: usize, limit: usize },
    #[error("repository error: {0}")]
    Repository(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for UnitscanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl UnitscanError {
    pub fn context<T: fmt::Display>(self, ctx: T) -> Self {
        match self {
            UnitscanError::Repository(msg) => UnitscanError::Repository(format!("{ctx}: {msg}")),
            UnitscanError::Serialization(msg) => {
                UnitscanError::Serialization(format!("{ctx}: {msg}"))
            }
            other => other,
        }
    }
}

/// Why a matrix directory was rejected by path-safety validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnsafeReason {
    NotRelative,
    ParentTraversal,
    InvalidSegment,
    ControlCharacter,
}

impl fmt::Display for UnsafeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnsafeReason::NotRelative => "expected a relative repository path",
            UnsafeReason::ParentTraversal => "parent traversal is forbidden",
            UnsafeReason::InvalidSegment => "invalid path segment",
            UnsafeReason::ControlCharacter => "control characters are forbidden",
        };
        f.write_str(text)
    }
}
