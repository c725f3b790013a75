//! Pipeline Error Taxonomy
//!
//! Three fatal classes (schema, coverage, compatibility) plus I/O and
//! parse wrappers. Per-row data gaps are represented as `Option`/NaN
//! values at the call sites, never as errors.

use std::path::PathBuf;

/// Errors produced by the sepsel data pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required column is absent from an input artifact
    #[error(
        "{artifact}: no {field} column found; tried {candidates:?}, file has {found:?}"
    )]
    Schema {
        /// Which artifact was being read
        artifact: &'static str,
        /// The logical field that could not be resolved
        field: &'static str,
        /// Candidate column names, in the order they were tried
        candidates: Vec<&'static str>,
        /// Column names actually present
        found: Vec<String>,
    },

    /// A join or filter left zero usable rows
    #[error("no usable data after {step}: {detail}")]
    Coverage {
        /// The pipeline step at which coverage collapsed
        step: &'static str,
        /// What was filtered or joined away
        detail: String,
    },

    /// Artifacts disagree in a way that would make results meaningless
    #[error("incompatible artifacts: {0}")]
    Compatibility(String),

    /// Underlying I/O failure
    #[error("{path}: {source}")]
    Io {
        /// File being read or written
        path: PathBuf,
        /// OS-level error
        #[source]
        source: std::io::Error,
    },

    /// Malformed artifact content
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },
}

impl Error {
    /// Coverage error helper
    pub fn coverage(step: &'static str, detail: impl Into<String>) -> Self {
        Error::Coverage {
            step,
            detail: detail.into(),
        }
    }

    /// I/O error helper
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Parse error helper
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
