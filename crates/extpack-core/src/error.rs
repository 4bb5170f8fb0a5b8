//! Error types for extpack

use thiserror::Error;

/// Core error type for extpack operations
#[derive(Error, Debug)]
pub enum ExtpackError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Object already exists: {0}")]
    DuplicateObject(String),

    #[error("Undefined symbol: {0}")]
    UndefinedSymbol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for extpack operations
pub type Result<T> = std::result::Result<T, ExtpackError>;
