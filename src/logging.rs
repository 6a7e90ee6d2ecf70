//! Process-wide `tracing` subscriber setup.
//!
//! Only the binary calls [`init`]; library code just emits events.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Name of the log file written next to the downloaded works.
pub const LOG_FILE_NAME: &str = "tankobon.log";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Options for [`init`].
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Lower the default level to DEBUG.
    pub debug: bool,
    /// Directory for [`LOG_FILE_NAME`]. No file output when `None`.
    pub file_dir: Option<PathBuf>,
}

/// Keeps the file writer alive. Dropping it flushes pending lines.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Builds a level filter. `RUST_LOG` wins over `default`.
fn env_filter(default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy()
}

/// Installs the stderr layer and, optionally, a plain-text file layer.
///
/// Progress already reaches the terminal through the console, so stderr
/// only shows warnings unless `debug` is set. The file gets everything
/// from INFO up.
pub fn init(options: &LogOptions) -> Result<LogGuard, LogError> {
    let (stderr_level, file_level) = if options.debug {
        (LevelFilter::DEBUG, LevelFilter::DEBUG)
    } else {
        (LevelFilter::WARN, LevelFilter::INFO)
    };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(io::stderr)
        .with_filter(env_filter(stderr_level));

    let (file_layer, guard) = match &options.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter(file_level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(LogGuard { _file: guard })
}
