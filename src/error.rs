// Error types for loading and exporting notification data.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal pipeline errors. Per-row and per-field problems never show up here;
/// they are counted in [`crate::loader::LoadReport`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source file missing or unreadable.
    #[error("source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The whole source could not be decoded with the declared encoding.
    #[error("could not decode {path} as {encoding}")]
    DecodeError { path: PathBuf, encoding: String },

    /// The encoding label is not known to `encoding_rs`.
    #[error("unknown text encoding '{label}'")]
    UnknownEncoding { label: String },

    /// The source has no readable header row.
    #[error("missing header row in {path}")]
    MissingHeader { path: PathBuf },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
