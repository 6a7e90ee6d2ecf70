//! Error types for Tankobon.
//!
//! Uses `thiserror` for structured error definitions, one enum per pipeline
//! stage. Every stage absorbs its own failures into skip decisions; only
//! [`RunError`] describes a whole-run failure.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for fetching a single remote asset.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, timeout or body read failure
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    /// Response completed but is too small to be a real page image
    #[error("Response too small ({bytes} bytes, need more than {minimum})")]
    TooSmall { bytes: u64, minimum: u64 },

    /// Writing the body to the sink failed
    #[error("Failed to write asset: {0}")]
    Io(#[from] std::io::Error),

    /// All attempts failed
    #[error("All {attempts} attempts failed, last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<FetchError> },
}

/// Error type for the rendered-page accessor.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The rendering engine could not be started
    #[error("Failed to start page session: {0}")]
    Launch(String),

    /// Navigation failed
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// Navigation or rendering did not finish in time
    #[error("Timed out after {seconds}s loading {url}")]
    Timeout { url: String, seconds: u64 },

    /// A selector set could not be evaluated
    #[error("Query failed: {0}")]
    Query(String),

    /// Query issued before any page was loaded
    #[error("No page loaded")]
    NoPage,

    /// HTTP request made by the accessor failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Error type for chapter document composition.
#[derive(Error, Debug)]
pub enum ComposeError {
    /// Called with an empty image list
    #[error("No input images")]
    NoInput,

    /// No image could be opened while surveying widths
    #[error("None of the {0} images could be read")]
    UnreadableSet(usize),

    /// Every image failed during the write pass
    #[error("No page could be written")]
    NoPagesWritten,

    /// A page could not be decoded or re-encoded
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    /// Output document could not be written
    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for merging chapter documents.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Nothing left to merge after skipping missing sources
    #[error("No source documents to merge")]
    EmptyMerge,

    /// Output document could not be written
    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Whole-run failures of the pipeline.
#[derive(Error, Debug)]
pub enum RunError {
    /// Working directories could not be created
    #[error("Failed to prepare working directory: {0}")]
    Setup(#[from] std::io::Error),

    /// Source location is not a valid URL
    #[error("Invalid source URL '{0}'")]
    InvalidSource(String),

    /// Final document could not be produced
    #[error("Merge failed: {0}")]
    Merge(#[from] MergeError),

    /// A blocking compose or merge task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
