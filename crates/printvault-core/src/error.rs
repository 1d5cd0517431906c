use std::path::PathBuf;

/// Central error type for the PrintVault system.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("file not found: {checksum}")]
    FileNotFound { checksum: String },

    #[error("tag not found: {name}")]
    TagNotFound { name: String },

    #[error("collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("slicer not found: {id}")]
    SlicerNotFound { id: String },

    #[error("profile not found: {id}")]
    ProfileNotFound { id: String },

    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("invariant violation: {message}")]
    Conflict { message: String },

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("metadata extraction failed for {checksum}: {message}")]
    Extraction { checksum: String, message: String },

    #[error("slicing failed: {message}")]
    Slicing { message: String },

    #[error("capacity exceeded: {message}")]
    Capacity { message: String },

    #[error("library not initialized at {path} (run `printvault init`)")]
    NotInitialized { path: PathBuf },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}
