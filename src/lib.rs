//! Tankobon - manga chapter downloader and volume assembler.
//!
//! This library provides functionality for:
//! - Discovering chapters and page images on JavaScript-rendered reader sites
//! - Downloading page images concurrently with bounded retries
//! - Composing each chapter into a width-normalized PDF
//! - Merging chapter PDFs into a single volume

pub mod composer;
pub mod config;
pub mod console;
pub mod cookies;
pub mod discovery;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod layout;
pub mod logging;
pub mod merger;
pub mod pipeline;
pub mod session;

// Re-export commonly used types
pub use composer::{ChapterDocument, DocumentComposer};
pub use config::Config;
pub use console::Console;
pub use discovery::{ChapterRef, StructuralDiscovery};
pub use downloader::{DownloadCoordinator, PageAsset};
pub use error::{ComposeError, ConfigError, FetchError, MergeError, RunError, SessionError};
pub use fetcher::ImageFetcher;
pub use layout::WorkLayout;
pub use pipeline::{AggregateResult, ChapterRange, Pipeline};
