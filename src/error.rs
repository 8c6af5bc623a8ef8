//! Error types and exit codes for ctx-engine

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for ctx-engine operations
#[derive(Error, Debug)]
pub enum CtxError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported language for extension: {extension}")]
    UnsupportedLanguage { extension: String },

    #[error("Failed to parse file: {message}")]
    ParseFailure { message: String },

    #[error("Semantic extraction failed: {message}")]
    ExtractionFailure { message: String },

    #[error("Embedding backend failed: {message}")]
    EmbeddingFailure { message: String },

    #[error("Persisted cache rejected: {message}")]
    CacheCorrupted { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CtxError {
    /// Convert error to an exit code for the binary:
    /// - 0: Success
    /// - 1: File not found / IO error
    /// - 2: Unsupported language
    /// - 3: Parse failure
    /// - 4: Internal failure (extraction, embedding, cache)
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::FileNotFound { .. } => ExitCode::from(1),
            Self::UnsupportedLanguage { .. } => ExitCode::from(2),
            Self::ParseFailure { .. } => ExitCode::from(3),
            Self::ExtractionFailure { .. } => ExitCode::from(4),
            Self::EmbeddingFailure { .. } => ExitCode::from(4),
            Self::CacheCorrupted { .. } => ExitCode::from(4),
            Self::Io(_) => ExitCode::from(1),
        }
    }
}

/// Result type alias for ctx-engine operations
pub type Result<T> = std::result::Result<T, CtxError>;
