//! Error type shared by all stages of the contraction pipeline.
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading, contracting or writing correlators.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Hdf5(#[from] hdf5::Error),

    /// A file exists but does not have the expected layout.
    #[error("format error: {0}")]
    Format(String),

    /// The run configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// An argument is outside of its valid domain.
    #[error("invalid value: {0}")]
    Value(String),

    /// The requested feature combination is not supported.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// A file name template references a key without a replacement.
    #[error("template `{template}` has no replacement for `{key}`")]
    Template { template: String, key: String },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Pickle(#[from] serde_pickle::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Encoding or decoding a message exchanged between workers failed.
    #[error("message serialization failed: {0}")]
    Message(#[from] bincode::Error),
}

impl Error {
    /// Wraps an [`std::io::Error`] together with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
