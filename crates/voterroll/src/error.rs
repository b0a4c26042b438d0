use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Import job {0} not found")]
    NotFound(i64),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

/// Failures of one OCR worker invocation.
///
/// `Parse` covers malformed worker output; every other variant is a
/// failure of the subprocess itself.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unparseable worker output: {0}")]
    Parse(String),

    #[error("OCR worker failed ({status}): {stderr}")]
    Subprocess { status: String, stderr: String },

    #[error("OCR worker timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("OCR worker output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("Failed to start OCR worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to OCR worker: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not find a free file name in '{0}'")]
    FileExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, ImportError>;
