//! Error types for labroster

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    #[error("Missing source file: {0}")]
    MissingSource(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Storage inconsistency: {0}")]
    StorageInconsistency(String),

    #[error("Rejected upload: {0}")]
    RejectedUpload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
