//! Tankobon CLI - manga chapter downloader and volume assembler.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use reqwest::cookie::Jar;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tankobon::config::{Backend, Config};
use tankobon::console::Console;
use tankobon::cookies::load_site_cookies;
use tankobon::error::Result;
use tankobon::http::create_http_client;
use tankobon::logging::{self, LogOptions};
use tankobon::pipeline::{self, ChapterRange, Pipeline, request_abort};
use tankobon::{DocumentComposer, WorkLayout};
use tracing::warn;
use url::Url;

/// Exit status after a forced interrupt (128 + SIGINT).
const INTERRUPT_EXIT_CODE: i32 = 130;

/// Manga chapter downloader and volume assembler.
#[derive(Parser, Debug)]
#[command(name = "tankobon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for downloaded works.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Concurrent page downloads per chapter.
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    workers: Option<u32>,

    /// Page accessor used for discovery.
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,

    /// Verbose logging on stderr.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a work and assemble its chapters.
    Download {
        /// URL of the work's landing page.
        url: String,

        /// Download every chapter, ignoring --start and --end.
        #[arg(long)]
        all: bool,

        /// First chapter number to download (may be fractional).
        #[arg(long)]
        start: Option<f64>,

        /// Last chapter number to download, inclusive.
        #[arg(long)]
        end: Option<f64>,
    },

    /// Re-compose chapter PDFs from already downloaded pages, then merge.
    Rebuild {
        /// Work directory containing capitulo_<n> folders.
        work_dir: PathBuf,
    },

    /// Merge existing chapter PDFs into the final document.
    Merge {
        /// Work directory containing a pdfs folder.
        work_dir: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(output) = &cli.output {
        config.paths.output_directory = output.clone();
    }
    if let Some(workers) = cli.workers {
        config.download.workers = workers as usize;
    }
    if let Some(backend) = cli.backend {
        config.discovery.backend = backend;
    }
    if cli.debug {
        config.logging.debug = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn chapter_range(all: bool, start: Option<f64>, end: Option<f64>) -> Result<ChapterRange> {
    if all {
        return Ok(ChapterRange::all());
    }
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            bail!(
                "Start chapter ({}) cannot be greater than end chapter ({})",
                start,
                end
            );
        }
    }
    Ok(ChapterRange::new(start, end))
}

async fn download(
    config: &Config,
    console: &Console,
    source: &str,
    range: ChapterRange,
) -> Result<ExitCode> {
    let url = Url::parse(source).with_context(|| format!("Invalid URL: {}", source))?;

    let jar = match config
        .cookie_dir()
        .map_err(anyhow::Error::from)
        .and_then(|dir| load_site_cookies(&dir, &url).map_err(anyhow::Error::from))
    {
        Ok(seeded) => {
            if let Some(path) = &seeded.source {
                console.info(&format!(
                    "Loaded {} cookies from {}",
                    seeded.loaded,
                    path.display()
                ));
            }
            seeded.jar
        }
        Err(err) => {
            warn!(error = %err, "cookie file not loaded");
            console.warning(&format!("Cookies not loaded: {}", err));
            Arc::new(Jar::default())
        }
    };

    let client = create_http_client(&config.download, jar, Some(&url))
        .context("Failed to build HTTP client")?;
    let sessions = pipeline::session_factory(config, client.clone());
    console.info(&format!("Using {} page accessor", sessions.name()));

    let abort = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::new(source, config, client, sessions)?
        .with_abort_flag(Arc::clone(&abort))
        .with_console(console.clone());

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if request_abort(&abort) {
                warn!("second interrupt, exiting immediately");
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
            warn!("interrupt received, stopping after the current chapter");
        }
    });

    let result = pipeline.run(&range).await?;
    console.summary(&result);

    Ok(if result.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let console = Console::new();

    console.section("Tankobon - Manga Downloader");

    let config = load_config(&cli)?;

    let _log_guard = logging::init(&LogOptions {
        debug: config.logging.debug,
        file_dir: config
            .logging
            .file
            .then(|| config.paths.output_directory.clone()),
    })
    .context("Failed to initialize logging")?;

    match cli.command {
        Command::Download {
            url,
            all,
            start,
            end,
        } => {
            let range = chapter_range(all, start, end)?;
            download(&config, &console, &url, range).await
        }
        Command::Rebuild { work_dir } => {
            if !work_dir.is_dir() {
                bail!("Not a directory: {}", work_dir.display());
            }
            let layout = WorkLayout::from_work_dir(&work_dir);
            let composer = DocumentComposer::new(config.compose.jpeg_quality);
            let result = pipeline::rebuild(
                &layout,
                &composer,
                config.compose.include_cover,
                &console,
            )
            .await?;
            console.summary(&result);
            Ok(if result.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Merge { work_dir } => {
            let layout = WorkLayout::from_work_dir(&work_dir);
            match pipeline::merge_existing(&layout).await {
                Ok(path) => {
                    console.success(&format!("Final document: {}", path.display()));
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    console.error(&format!("Merge failed: {}", err));
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
