//! Error types for the paper search engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use crate::encoder::EncoderKind;
use crate::types::{MatrixError, PaperId};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// File system errors
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Encoder lifecycle errors
    #[error(
        "Encoder '{kind}' is not ready\nSuggestion: Initialize the registry first, or check the model artifacts in the models directory"
    )]
    EncoderNotReady { kind: EncoderKind },

    #[error("Encoding failed for '{kind}': {reason}")]
    EncodingFailed { kind: EncoderKind, reason: String },

    /// Matrix artifact errors
    #[error("Failed to persist matrix to '{path}': {source}")]
    PersistenceError {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to load matrix from '{path}': {source}")]
    LoadError {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("No matrix artifact for encoder '{kind}'. Did you mean to run an embedding update first?")]
    MatrixMissing { kind: EncoderKind },

    #[error("Paper {id} is not in the embedding matrix. The paper may be new or not yet encoded.")]
    PaperNotIndexed { id: PaperId },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },

    /// Remote store errors
    #[error("Remote store operation failed during {operation}: {cause}")]
    RemoteError { operation: String, cause: String },

    /// Matrix math and storage errors
    #[error(transparent)]
    Matrix(#[from] MatrixError),

    /// Topic clustering errors
    #[error(transparent)]
    Clustering(#[from] crate::topics::ClusteringError),

    /// General errors for cases where we need to preserve existing behavior
    #[error("{0}")]
    General(String),
}

impl EngineError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::EncoderNotReady { .. } => "ENCODER_NOT_READY",
            Self::EncodingFailed { .. } => "ENCODING_FAILED",
            Self::PersistenceError { .. } => "PERSISTENCE_ERROR",
            Self::LoadError { .. } => "LOAD_ERROR",
            Self::MatrixMissing { .. } => "MATRIX_MISSING",
            Self::PaperNotIndexed { .. } => "PAPER_NOT_INDEXED",
            Self::ConfigError { .. } => "CONFIG_ERROR",
            Self::RemoteError { .. } => "REMOTE_ERROR",
            Self::Matrix(_) => "MATRIX_ERROR",
            Self::Clustering(_) => "CLUSTERING_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::EncoderNotReady { .. } => vec![
                "Run 'paperlens status' to see which backends are available",
                "Sentence encoders need the embedding model downloaded on first use",
                "The topic-model encoder needs a fitted artifact in the models directory",
            ],
            Self::MatrixMissing { .. } => vec![
                "Run 'paperlens update' to build the embedding matrix",
                "Run 'paperlens pull' if the matrix lives in a remote store",
            ],
            Self::LoadError { .. } | Self::PersistenceError { .. } => vec![
                "Run 'paperlens update --force' to rebuild the matrix from scratch",
                "Check disk space and permissions in the cache directory",
            ],
            Self::PaperNotIndexed { .. } => vec![
                "Run 'paperlens update' so new papers get encoded",
                "Verify the paper ID exists in the corpus",
            ],
            Self::RemoteError { .. } => vec![
                "Check that the remote store path is reachable and writable",
                "Try the operation again, it may succeed on retry",
            ],
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            _ => vec![],
        }
    }
}

/// Errors specific to remote store synchronization
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote object '{key}' not found")]
    RemoteMissing { key: String },

    #[error("Transfer failed for '{key}': {reason}")]
    Transfer { key: String, reason: String },

    #[error("Malformed timestamp '{value}' for key '{key}'")]
    BadTimestamp { key: String, value: String },

    #[error("Timestamp file is not valid JSON: {0}")]
    BadTimestampFile(String),
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for matrix operations
pub type MatrixResult<T> = Result<T, MatrixError>;

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, EngineError>;

    /// Add context with a path
    fn with_path(self, path: &std::path::Path) -> Result<T, EngineError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, EngineError> {
        self.map_err(|e| EngineError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, EngineError> {
        self.map_err(|e| {
            EngineError::General(format!("Error processing '{}': {}", path.display(), e))
        })
    }
}
