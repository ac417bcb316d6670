use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type used across the crate.
pub type HwdbResult<T> = Result<T, HwdbError>;

/// Error type returned by docket loading, sheet ingestion, encoding and submission.
///
/// Type-coercion problems are never errors; they surface as
/// [`crate::coercion::CastWarning`]s attached to the affected record.
#[derive(Debug, Error)]
pub enum HwdbError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "excel")]
    /// Excel ingestion error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// CSV ingestion error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON in a docket or lookup file.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A `Files` glob pattern could not be compiled.
    #[error("invalid file pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    /// The docket structure is malformed.
    #[error("invalid docket: {message}")]
    InvalidDocket { message: String },

    /// An encoder (or a schema node inside it) is malformed or cannot be resolved.
    #[error("invalid encoder: {message}")]
    InvalidEncoder { message: String },

    /// A field marked `required` resolved to null.
    #[error("invalid encoder: required field '{field}' has no value (file '{file}', sheet '{sheet}', row {row})")]
    MissingField {
        field: String,
        file: PathBuf,
        sheet: String,
        row: usize,
    },

    /// A narrower scope redefined a value already set at a broader scope.
    #[error("conflicting value for '{key}' in {scope}: '{existing}' was already set, got '{new}'")]
    ValueConflict {
        key: String,
        scope: String,
        existing: String,
        new: String,
    },

    /// Part Type ID and Part Type Name were both given but name different types.
    #[error("part type ID '{id}' and part type name '{name}' do not refer to the same part type")]
    PartTypeMismatch { id: String, name: String },

    /// A named sheet does not exist in the workbook.
    #[error("sheet '{sheet}' not found in {}", path.display())]
    SheetNotFound { path: PathBuf, sheet: String },

    /// The file extension does not map to a supported spreadsheet format.
    #[error("unsupported file format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The worker pool for sheet jobs could not be started.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl HwdbError {
    pub(crate) fn invalid_docket(message: impl Into<String>) -> Self {
        Self::InvalidDocket {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_encoder(message: impl Into<String>) -> Self {
        Self::InvalidEncoder {
            message: message.into(),
        }
    }

    /// Whether this error is a validation failure that must abort a docket before any
    /// network call is made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDocket { .. }
                | Self::InvalidEncoder { .. }
                | Self::MissingField { .. }
                | Self::ValueConflict { .. }
                | Self::PartTypeMismatch { .. }
        )
    }
}
