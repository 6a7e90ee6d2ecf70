//! Run orchestration: cover, discovery, per-chapter fetch and compose, merge.
//!
//! ```text
//! Init -> CoverFetch -> Discovery -> { Fetch -> Compose }* -> Merge -> Done
//!                                       \-> ChapterFailed -/
//! ```
//!
//! Chapters run one after another; only page downloads inside a chapter
//! are concurrent. A failing chapter is recorded and the loop moves on.

use crate::composer::{ChapterDocument, DocumentComposer};
use crate::config::{Backend, Config};
use crate::console::Console;
use crate::discovery::{ChapterRef, StructuralDiscovery};
use crate::downloader::{DownloadCoordinator, PageAsset, image_extension};
use crate::error::RunError;
use crate::fetcher::ImageFetcher;
use crate::layout::{WorkLayout, staged_pages};
use crate::merger;
use crate::session::{HtmlFactory, SessionFactory};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Stages of a run, as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Init,
    CoverFetch,
    Discovery,
    Fetch,
    Compose,
    ChapterFailed,
    Merge,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Init => "init",
            RunStage::CoverFetch => "cover",
            RunStage::Discovery => "discovery",
            RunStage::Fetch => "fetch",
            RunStage::Compose => "compose",
            RunStage::ChapterFailed => "chapter-failed",
            RunStage::Merge => "merge",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Inclusive chapter-number filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChapterRange {
    pub start: f64,
    pub end: Option<f64>,
}

impl Default for ChapterRange {
    fn default() -> Self {
        Self {
            start: 1.0,
            end: None,
        }
    }
}

impl ChapterRange {
    /// Accepts every chapter, including prologues numbered below 1.
    pub fn all() -> Self {
        Self {
            start: f64::NEG_INFINITY,
            end: None,
        }
    }

    pub fn new(start: Option<f64>, end: Option<f64>) -> Self {
        Self {
            start: start.unwrap_or(1.0),
            end,
        }
    }

    pub fn contains(&self, number: f64) -> bool {
        number >= self.start && self.end.is_none_or(|end| number <= end)
    }
}

/// Why a chapter produced no document.
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterFailure {
    /// Discovery found no page images.
    NoPages,
    /// Every page download failed.
    NoDownloads,
    /// The staging directory could not be prepared.
    Staging(String),
    /// Composition failed.
    Compose(String),
}

impl fmt::Display for ChapterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterFailure::NoPages => write!(f, "no page images found"),
            ChapterFailure::NoDownloads => write!(f, "no page could be downloaded"),
            ChapterFailure::Staging(msg) => write!(f, "staging failed: {msg}"),
            ChapterFailure::Compose(msg) => write!(f, "compose failed: {msg}"),
        }
    }
}

/// Per-chapter record kept for the summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterOutcome {
    pub number: f64,
    pub title: String,
    pub pages_found: usize,
    pub pages_downloaded: usize,
    pub elapsed: Duration,
    /// Size of the chapter document on disk.
    pub document_bytes: Option<u64>,
    pub result: Result<ChapterDocument, ChapterFailure>,
}

/// Everything a run produced. Accumulated as the run progresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult {
    pub chapters_attempted: usize,
    pub chapters_succeeded: usize,
    /// Successful chapters, ascending by number.
    pub chapter_documents: Vec<ChapterDocument>,
    pub final_document: Option<PathBuf>,
    pub final_document_bytes: Option<u64>,
    pub chapters: Vec<ChapterOutcome>,
    pub elapsed: Duration,
    /// The run was interrupted between chapters.
    pub aborted: bool,
}

impl AggregateResult {
    /// At least one chapter was composed. Merge failure does not change this.
    pub fn success(&self) -> bool {
        self.chapters_succeeded > 0
    }

    fn record(&mut self, outcome: ChapterOutcome) {
        self.chapters_attempted += 1;
        if let Ok(doc) = &outcome.result {
            self.chapters_succeeded += 1;
            self.chapter_documents.push(doc.clone());
        }
        self.chapters.push(outcome);
    }
}

/// Picks the accessor backend, falling back to plain HTML when Chromium
/// was not compiled in.
pub fn session_factory(config: &Config, client: reqwest::Client) -> Arc<dyn SessionFactory> {
    let discovery = &config.discovery;
    match discovery.backend {
        #[cfg(feature = "chromium")]
        Backend::Chromium => Arc::new(crate::session::ChromiumFactory::new(discovery)),
        #[cfg(not(feature = "chromium"))]
        Backend::Chromium => {
            warn!("built without chromium support, using the html backend");
            Arc::new(HtmlFactory::new(client, discovery.navigation_timeout()))
        }
        Backend::Html => Arc::new(HtmlFactory::new(client, discovery.navigation_timeout())),
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

/// Composes on the blocking pool.
async fn compose_blocking(
    composer: &DocumentComposer,
    images: Vec<PathBuf>,
    output: PathBuf,
    cover: Option<PathBuf>,
    number: f64,
) -> Result<ChapterDocument, ChapterFailure> {
    let composer = composer.clone();
    let task = tokio::task::spawn_blocking(move || {
        composer.compose(&images, &output, cover.as_deref(), number)
    });
    match task.await {
        Ok(Ok(doc)) => Ok(doc),
        Ok(Err(err)) => Err(ChapterFailure::Compose(err.to_string())),
        Err(err) => Err(ChapterFailure::Compose(err.to_string())),
    }
}

/// Merges on the blocking pool and fills in the final document fields.
async fn merge_into(result: &mut AggregateResult, output: PathBuf, console: &Console) {
    if result.chapter_documents.is_empty() {
        return;
    }
    info!(stage = %RunStage::Merge, documents = result.chapter_documents.len(), "merging");
    console.step(&format!(
        "Merging {} chapters...",
        result.chapter_documents.len()
    ));

    let documents = result.chapter_documents.clone();
    let task = tokio::task::spawn_blocking(move || merger::merge(&documents, &output));
    match task.await {
        Ok(Ok(path)) => {
            result.final_document_bytes = file_size(&path);
            console.success(&format!("Final document: {}", path.display()));
            result.final_document = Some(path);
        }
        Ok(Err(err)) => {
            warn!(error = %err, "merge failed");
            console.error(&format!("Merge failed: {}", err));
        }
        Err(err) => {
            warn!(error = %err, "merge task failed");
            console.error(&format!("Merge failed: {}", err));
        }
    }
}

/// Raises the abort flag. Returns `true` when an abort was already pending,
/// which callers treat as a request to stop right away.
pub fn request_abort(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

/// One download-and-assemble run for a single work.
pub struct Pipeline {
    source: String,
    layout: WorkLayout,
    discovery: StructuralDiscovery,
    fetcher: ImageFetcher,
    downloader: DownloadCoordinator,
    composer: DocumentComposer,
    include_cover: bool,
    abort: Arc<AtomicBool>,
    console: Console,
}

impl Pipeline {
    /// Wires a run for the work at `source`.
    ///
    /// `client` carries the session cookies and headers for every image
    /// request; `sessions` opens the rendered-page accessor for discovery.
    pub fn new(
        source: &str,
        config: &Config,
        client: reqwest::Client,
        sessions: Arc<dyn SessionFactory>,
    ) -> Result<Self, RunError> {
        url::Url::parse(source).map_err(|_| RunError::InvalidSource(source.to_string()))?;

        let fetcher = ImageFetcher::new(client, &config.download);
        Ok(Self {
            source: source.to_string(),
            layout: WorkLayout::from_source(&config.paths.output_directory, source),
            discovery: StructuralDiscovery::new(
                sessions,
                config.discovery.chapter_settle(),
                config.discovery.page_settle(),
            ),
            downloader: DownloadCoordinator::new(fetcher.clone(), config.download.workers),
            fetcher,
            composer: DocumentComposer::new(config.compose.jpeg_quality),
            include_cover: config.compose.include_cover,
            abort: Arc::new(AtomicBool::new(false)),
            console: Console::new(),
        })
    }

    /// Shares an externally owned abort flag (e.g. set by Ctrl-C).
    pub fn with_abort_flag(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn layout(&self) -> &WorkLayout {
        &self.layout
    }

    /// Runs the whole flow for chapters inside `range`.
    ///
    /// Only a failure to create the work directory is an error; everything
    /// else is reported through the returned result.
    pub async fn run(&self, range: &ChapterRange) -> Result<AggregateResult, RunError> {
        let started = Instant::now();
        let mut result = AggregateResult::default();

        info!(
            stage = %RunStage::Init,
            source = %self.source,
            work = self.layout.work_id(),
            "run started"
        );
        self.layout.ensure_dirs()?;
        self.console.info(&format!(
            "Working directory: {}",
            self.layout.work_dir().display()
        ));

        let cover = if self.include_cover {
            self.fetch_cover().await
        } else {
            None
        };

        info!(stage = %RunStage::Discovery, "listing chapters");
        self.console.step("Discovering chapters...");
        let chapters = self.discovery.list_chapters(&self.source).await;
        if chapters.is_empty() {
            self.console.error("No chapters found");
            info!(stage = %RunStage::Done, "nothing to do");
            result.elapsed = started.elapsed();
            return Ok(result);
        }

        let total = chapters.len();
        let selected: Vec<ChapterRef> = chapters
            .into_iter()
            .filter(|chapter| range.contains(chapter.number))
            .collect();
        self.console.success(&format!(
            "Found {} chapters, {} selected",
            total,
            selected.len()
        ));

        for (index, chapter) in selected.iter().enumerate() {
            if self.abort.load(Ordering::SeqCst) {
                warn!(remaining = selected.len() - index, "run aborted between chapters");
                self.console.warning("Interrupted, finishing with the chapters done so far");
                result.aborted = true;
                break;
            }

            self.console.section(&format!(
                "Chapter {} ({}/{}): {}",
                crate::layout::format_chapter_number(chapter.number),
                index + 1,
                selected.len(),
                chapter.title
            ));
            let outcome = self.process_chapter(chapter, cover.as_deref()).await;
            match &outcome.result {
                Ok(doc) => self.console.success(&format!(
                    "{} pages composed in {:.1}s",
                    doc.page_count,
                    outcome.elapsed.as_secs_f64()
                )),
                Err(failure) => {
                    info!(
                        stage = %RunStage::ChapterFailed,
                        chapter = chapter.number,
                        reason = %failure,
                        "chapter skipped"
                    );
                    self.console.warning(&format!("Chapter skipped: {}", failure));
                }
            }
            result.record(outcome);
        }

        merge_into(&mut result, self.layout.final_pdf(), &self.console).await;

        result.elapsed = started.elapsed();
        info!(
            stage = %RunStage::Done,
            attempted = result.chapters_attempted,
            succeeded = result.chapters_succeeded,
            "run finished"
        );
        Ok(result)
    }

    /// Best effort; any failure just means no cover.
    async fn fetch_cover(&self) -> Option<PathBuf> {
        info!(stage = %RunStage::CoverFetch, "looking for cover");
        self.console.step("Looking for cover...");
        let url = self.discovery.find_cover(&self.source).await?;

        let dest = self.layout.cover_path(image_extension(&url));
        match self.fetcher.fetch_to_path(&url, &dest).await {
            Ok(_) => {
                self.console.success("Cover downloaded");
                Some(dest)
            }
            Err(err) => {
                warn!(url = %url, error = %err, "cover download failed");
                self.console.warning("Cover could not be downloaded, continuing without it");
                None
            }
        }
    }

    async fn process_chapter(&self, chapter: &ChapterRef, cover: Option<&Path>) -> ChapterOutcome {
        let started = Instant::now();
        let mut outcome = ChapterOutcome {
            number: chapter.number,
            title: chapter.title.clone(),
            pages_found: 0,
            pages_downloaded: 0,
            elapsed: Duration::ZERO,
            document_bytes: None,
            result: Err(ChapterFailure::NoPages),
        };

        info!(
            stage = %RunStage::Fetch,
            chapter = chapter.number,
            url = %chapter.source_url,
            "fetching chapter"
        );
        let urls = self.discovery.list_page_images(&chapter.source_url).await;
        outcome.pages_found = urls.len();
        if urls.is_empty() {
            outcome.elapsed = started.elapsed();
            return outcome;
        }
        self.console.info(&format!("Downloading {} pages...", urls.len()));

        let stage_dir = self.layout.chapter_dir(chapter.number);
        let downloaded = match self
            .downloader
            .download_all(PageAsset::from_uris(urls), &stage_dir)
            .await
        {
            Ok(pages) => pages,
            Err(err) => {
                outcome.result = Err(ChapterFailure::Staging(err.to_string()));
                outcome.elapsed = started.elapsed();
                return outcome;
            }
        };
        outcome.pages_downloaded = downloaded.len();
        if downloaded.is_empty() {
            outcome.result = Err(ChapterFailure::NoDownloads);
            outcome.elapsed = started.elapsed();
            return outcome;
        }

        info!(
            stage = %RunStage::Compose,
            chapter = chapter.number,
            pages = downloaded.len(),
            "composing chapter"
        );
        let images: Vec<PathBuf> = downloaded
            .into_iter()
            .filter_map(|page| page.local_path)
            .collect();
        let output = self.layout.chapter_pdf(chapter.number);
        outcome.result = compose_blocking(
            &self.composer,
            images,
            output,
            cover.map(Path::to_path_buf),
            chapter.number,
        )
        .await;
        if let Ok(doc) = &outcome.result {
            outcome.document_bytes = file_size(&doc.path);
        }
        outcome.elapsed = started.elapsed();
        outcome
    }
}

/// Re-composes every staged chapter of an existing work directory, then
/// merges.
pub async fn rebuild(
    layout: &WorkLayout,
    composer: &DocumentComposer,
    include_cover: bool,
    console: &Console,
) -> Result<AggregateResult, RunError> {
    let started = Instant::now();
    let mut result = AggregateResult::default();
    layout.ensure_dirs()?;

    let cover = if include_cover {
        layout.existing_cover()
    } else {
        None
    };
    let chapters = layout.staged_chapters()?;
    console.info(&format!("{} staged chapters found", chapters.len()));

    for (number, dir) in chapters {
        let chapter_started = Instant::now();
        let images = staged_pages(&dir)?;
        let mut outcome = ChapterOutcome {
            number,
            title: format!("capitulo {}", crate::layout::format_chapter_number(number)),
            pages_found: images.len(),
            pages_downloaded: images.len(),
            elapsed: Duration::ZERO,
            document_bytes: None,
            result: Err(ChapterFailure::NoDownloads),
        };

        if !images.is_empty() {
            outcome.result = compose_blocking(
                composer,
                images,
                layout.chapter_pdf(number),
                cover.clone(),
                number,
            )
            .await;
        }
        match &outcome.result {
            Ok(doc) => {
                outcome.document_bytes = file_size(&doc.path);
                console.success(&format!(
                    "Chapter {}: {} pages",
                    crate::layout::format_chapter_number(number),
                    doc.page_count
                ));
            }
            Err(failure) => console.warning(&format!(
                "Chapter {} skipped: {}",
                crate::layout::format_chapter_number(number),
                failure
            )),
        }
        outcome.elapsed = chapter_started.elapsed();
        result.record(outcome);
    }

    merge_into(&mut result, layout.final_pdf(), console).await;
    result.elapsed = started.elapsed();
    Ok(result)
}

/// Merges the chapter documents already present in a work's `pdfs`
/// directory into its final document.
pub async fn merge_existing(layout: &WorkLayout) -> Result<PathBuf, RunError> {
    let pdfs_dir = layout.pdfs_dir();
    let output = layout.final_pdf();
    let path = tokio::task::spawn_blocking(move || {
        let documents = merger::collect_chapter_documents(&pdfs_dir)?;
        info!(documents = documents.len(), "chapter documents found");
        merger::merge(&documents, &output).map_err(RunError::from)
    })
    .await??;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::tests::noise_image;
    use lopdf::Document;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes(dir: &Path, name: &str) -> Vec<u8> {
        let path = dir.join(name);
        noise_image(&path, 48, 64);
        std::fs::read(path).unwrap()
    }

    fn test_config(output: &Path) -> Config {
        let mut config = Config::default();
        config.paths.output_directory = output.to_path_buf();
        config.download.retry_delay_ms = 5;
        config.discovery.backend = Backend::Html;
        config.discovery.chapter_settle_ms = 0;
        config.discovery.page_settle_ms = 0;
        config.discovery.navigation_timeout_sec = 5;
        config.compose.include_cover = false;
        config
    }

    fn pipeline(server: &MockServer, config: &Config) -> Pipeline {
        let client = reqwest::Client::new();
        let sessions = session_factory(config, client.clone());
        Pipeline::new(&format!("{}/title/77-test", server.uri()), config, client, sessions)
            .unwrap()
            .with_console(Console::with_colors(false))
    }

    /// Serves a work with chapters 1..=3, two pages each.
    async fn serve_work(server: &MockServer, images: &Path) {
        let landing = r#"<html><body>
            <img class="thumb" src="/covers/thumb_77.png">
            <a href="/title/77-test/ch_3">Chapter 3</a>
            <a href="/title/77-test/ch_1">Chapter 1</a>
            <a href="/title/77-test/ch_2">Chapter 2</a>
        </body></html>"#;
        Mock::given(method("GET"))
            .and(path("/title/77-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(landing))
            .mount(server)
            .await;

        for chapter in 1..=3 {
            let reader = format!(
                r#"<html><body><div name="image-items">
                    <img src="/img/{chapter}/page-1.png">
                    <img src="/img/{chapter}/page-2.png">
                </div></body></html>"#
            );
            Mock::given(method("GET"))
                .and(path(format!("/title/77-test/ch_{chapter}")))
                .respond_with(ResponseTemplate::new(200).set_body_string(reader))
                .mount(server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/img/2/page-2.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
        let body = png_bytes(images, "page.png");
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_chapter_range() {
        let range = ChapterRange::new(Some(2.0), Some(3.0));
        assert!(!range.contains(1.5));
        assert!(range.contains(2.0));
        assert!(range.contains(2.5));
        assert!(range.contains(3.0));
        assert!(!range.contains(3.5));

        assert!(!ChapterRange::default().contains(0.5));
        assert!(ChapterRange::default().contains(500.0));
        assert!(ChapterRange::all().contains(0.0));
    }

    #[tokio::test]
    async fn test_end_to_end_with_one_failing_page() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        serve_work(&server, dir.path()).await;

        let config = test_config(&dir.path().join("out"));
        let pipeline = pipeline(&server, &config);
        let result = pipeline.run(&ChapterRange::default()).await.unwrap();

        assert!(result.success());
        assert_eq!(result.chapters_attempted, 3);
        assert_eq!(result.chapters_succeeded, 3);
        let pages: Vec<(f64, usize)> = result
            .chapter_documents
            .iter()
            .map(|d| (d.chapter_number, d.page_count))
            .collect();
        assert_eq!(pages, vec![(1.0, 2), (2.0, 1), (3.0, 2)]);

        let final_pdf = result.final_document.clone().unwrap();
        assert_eq!(final_pdf, pipeline.layout().final_pdf());
        assert!(final_pdf.ends_with("77-test/77-test_completo.pdf"));
        assert_eq!(Document::load(&final_pdf).unwrap().get_pages().len(), 5);

        let staged = pipeline.layout().chapter_dir(2.0);
        assert!(staged.join("pagina_001.png").exists());
        assert!(!staged.join("pagina_002.png").exists());
    }

    #[tokio::test]
    async fn test_cover_leads_every_chapter() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        serve_work(&server, dir.path()).await;

        let mut config = test_config(&dir.path().join("out"));
        config.compose.include_cover = true;
        let pipeline = pipeline(&server, &config);
        let result = pipeline
            .run(&ChapterRange::new(Some(3.0), None))
            .await
            .unwrap();

        assert!(pipeline.layout().cover_path("png").exists());
        assert_eq!(result.chapters_attempted, 1);
        assert_eq!(result.chapter_documents[0].page_count, 3);
    }

    #[tokio::test]
    async fn test_no_chapters_is_a_failed_run() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/title/77-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = test_config(&dir.path().join("out"));
        let pipeline = pipeline(&server, &config);
        let result = pipeline.run(&ChapterRange::all()).await.unwrap();

        assert!(!result.success());
        assert_eq!(result.chapters_attempted, 0);
        assert!(result.chapter_documents.is_empty());
        assert!(result.final_document.is_none());
        assert!(!pipeline.layout().final_pdf().exists());
        assert_eq!(
            std::fs::read_dir(pipeline.layout().pdfs_dir()).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_abort_before_first_chapter() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        serve_work(&server, dir.path()).await;

        let config = test_config(&dir.path().join("out"));
        let abort = Arc::new(AtomicBool::new(true));
        let pipeline = pipeline(&server, &config).with_abort_flag(Arc::clone(&abort));
        let result = pipeline.run(&ChapterRange::default()).await.unwrap();

        assert!(result.aborted);
        assert_eq!(result.chapters_attempted, 0);
        assert!(result.final_document.is_none());
    }

    #[test]
    fn test_second_abort_request_escalates() {
        let flag = AtomicBool::new(false);
        assert!(!request_abort(&flag));
        assert!(flag.load(Ordering::SeqCst));
        assert!(request_abort(&flag));
        assert!(request_abort(&flag));
    }

    #[tokio::test]
    async fn test_rebuild_and_merge_existing() {
        let dir = TempDir::new().unwrap();
        let layout = WorkLayout::from_work_dir(&dir.path().join("77-test"));
        layout.ensure_dirs().unwrap();

        for (number, pages) in [(1.0, 2), (1.5, 1)] {
            let chapter_dir = layout.chapter_dir(number);
            std::fs::create_dir_all(&chapter_dir).unwrap();
            for i in 1..=pages {
                noise_image(&chapter_dir.join(format!("pagina_{i:03}.png")), 30, 40);
            }
        }
        std::fs::create_dir_all(layout.chapter_dir(4.0)).unwrap();

        let console = Console::with_colors(false);
        let result = rebuild(&layout, &DocumentComposer::new(90), true, &console)
            .await
            .unwrap();
        assert_eq!(result.chapters_attempted, 3);
        assert_eq!(result.chapters_succeeded, 2);
        assert_eq!(
            result.chapters[2].result,
            Err(ChapterFailure::NoDownloads)
        );
        assert!(layout.chapter_pdf(1.5).exists());

        std::fs::remove_file(layout.final_pdf()).unwrap();
        let merged = merge_existing(&layout).await.unwrap();
        assert_eq!(Document::load(&merged).unwrap().get_pages().len(), 3);
    }
}
