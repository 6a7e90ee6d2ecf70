//! Structural discovery of chapters, page images and the cover.
//!
//! Every query is a ranked list of [`SelectorSet`]s tried in order until one
//! yields something. Supporting new reader markup means adding an entry to
//! one of the lists below, not new control flow.
//!
//! Discovery never fails past its boundary: an accessor that cannot start,
//! a navigation that times out, or a page without matches all produce an
//! empty result and a log line.

use crate::session::{ElementRecord, PageSession, SelectorSet, SessionFactory, Target};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Extracts the chapter number from a chapter URL (`.../ch_12.5`).
static CHAPTER_NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ch_(\d+(?:\.\d+)?)").unwrap());

/// Chapter link queries, primary first.
const CHAPTER_STRATEGIES: &[SelectorSet] = &[
    SelectorSet::script(
        &[r#"a[href*="/ch_"], a[href*="-ch_"], a[href*="chapter"]"#],
        Target::Href,
    ),
    SelectorSet::traversal(&[r#"a[href*="ch_"], a[href*="-ch_"]"#], Target::Href),
];

/// Page image queries, most specific first.
const PAGE_IMAGE_STRATEGIES: &[SelectorSet] = &[
    SelectorSet::script(&[r#"div[name="image-items"] img[src]"#], Target::Src),
    SelectorSet::script(&[r#"div[name="image-item"] img"#], Target::Src),
    SelectorSet::script(&[".chapter-images img"], Target::Src),
    SelectorSet::script(&[".reader img"], Target::Src),
    SelectorSet::script(&[".manga-reader img"], Target::Src),
    SelectorSet::script(&[r#"img[src*="media"]"#], Target::Src),
    SelectorSet::script(&[r#"img[src*="chapter"]"#], Target::Src),
    SelectorSet::traversal(&["img[src]"], Target::Src),
];

/// Cover image queries; the first match of the first hit wins.
const COVER_STRATEGIES: &[SelectorSet] = &[
    SelectorSet::script(&[r#"img[src*="thumb"]"#], Target::Src),
    SelectorSet::script(&[".manga-cover img"], Target::Src),
    SelectorSet::script(&[".cover img"], Target::Src),
    SelectorSet::script(&[r#"img[src*="cover"]"#], Target::Src),
    SelectorSet::script(&[".thumbnail img"], Target::Src),
    SelectorSet::script(&[r#"img[alt*="cover"]"#], Target::Src),
];

/// Path markers that identify a chapter link.
const CHAPTER_PATH_MARKERS: &[&str] = &["/ch_", "-ch_"];

/// URL fragments of site chrome that is never a page.
const IMAGE_DENYLIST: &[&str] = &["avatar", "logo", "icon", "banner"];

/// Page image URLs this short are placeholders.
const MIN_IMAGE_URL_LEN: usize = 10;

/// A chapter as listed on the work's landing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRef {
    /// Sort and filter key. Fractional for extras (12.5); may repeat.
    pub number: f64,
    /// Link text.
    pub title: String,
    /// Reader location. Identifies the chapter.
    pub source_url: String,
}

/// Parses the numeric token of a chapter URL.
///
/// `None` when the URL has no token; `Some(None)` when it has one that is
/// not a usable number.
pub fn chapter_number_token(url: &str) -> Option<Option<f64>> {
    let token = CHAPTER_NUMBER_REGEX.captures(url)?.get(1)?.as_str();
    Some(token.parse::<f64>().ok().filter(|n| n.is_finite()))
}

/// Turns raw link records into the ordered chapter list.
///
/// Numbers come from the URL token, or from the record's position among
/// accepted links when the URL has none. Links whose token does not parse
/// are dropped. Duplicated URLs keep their first occurrence. The result is
/// sorted by number; equal numbers keep first-seen order.
pub fn build_chapter_list(records: Vec<ElementRecord>) -> Vec<ChapterRef> {
    let mut seen = HashSet::new();
    let mut chapters = Vec::new();

    for (position, record) in records.into_iter().enumerate() {
        let number = match chapter_number_token(&record.url) {
            Some(Some(number)) => number,
            Some(None) => {
                warn!(url = %record.url, "chapter number does not parse, skipping");
                continue;
            }
            None => (position + 1) as f64,
        };

        if !seen.insert(record.url.clone()) {
            continue;
        }

        chapters.push(ChapterRef {
            number,
            title: record.text,
            source_url: record.url,
        });
    }

    chapters.sort_by(|a, b| a.number.total_cmp(&b.number));

    for pair in chapters.windows(2) {
        if pair[0].number == pair[1].number {
            warn!(
                number = pair[0].number,
                first = %pair[0].source_url,
                second = %pair[1].source_url,
                "two chapters share a number"
            );
        }
    }

    chapters
}

/// Keeps records that look like chapter links.
fn is_chapter_link(record: &ElementRecord, require_marker: bool) -> bool {
    if record.text.is_empty() {
        return false;
    }
    !require_marker
        || CHAPTER_PATH_MARKERS
            .iter()
            .any(|marker| record.url.contains(marker))
}

/// Drops site chrome from a page image list.
pub fn filter_page_images(urls: Vec<String>) -> Vec<String> {
    urls.into_iter()
        .filter(|url| url.len() > MIN_IMAGE_URL_LEN)
        .filter(|url| {
            let lower = url.to_ascii_lowercase();
            !IMAGE_DENYLIST.iter().any(|token| lower.contains(token))
        })
        .collect()
}

/// Discovery adapter over a session factory.
pub struct StructuralDiscovery {
    sessions: Arc<dyn SessionFactory>,
    landing_settle: Duration,
    reader_settle: Duration,
}

impl StructuralDiscovery {
    pub fn new(
        sessions: Arc<dyn SessionFactory>,
        landing_settle: Duration,
        reader_settle: Duration,
    ) -> Self {
        Self {
            sessions,
            landing_settle,
            reader_settle,
        }
    }

    /// Opens a session on `url` and lets it settle.
    ///
    /// On failure the session is already released and the reason logged.
    async fn open_at(&self, url: &str, settle: Duration) -> Option<Box<dyn PageSession>> {
        let mut session = match self.sessions.open().await {
            Ok(session) => session,
            Err(err) => {
                error!(backend = self.sessions.name(), error = %err, "could not open page session");
                return None;
            }
        };

        if let Err(err) = session.navigate(url).await {
            error!(url, error = %err, "navigation failed");
            session.release().await;
            return None;
        }

        session.wait_settled(settle).await;
        Some(session)
    }

    /// Runs `set` and logs instead of failing.
    async fn query(session: &mut dyn PageSession, set: &SelectorSet) -> Vec<ElementRecord> {
        match session.evaluate_selector_set(set).await {
            Ok(records) => records,
            Err(err) => {
                debug!(selectors = ?set.selectors, error = %err, "query failed");
                Vec::new()
            }
        }
    }

    /// Lists the chapters of a work, sorted by number.
    pub async fn list_chapters(&self, manga_url: &str) -> Vec<ChapterRef> {
        info!(url = manga_url, "listing chapters");
        let Some(mut session) = self.open_at(manga_url, self.landing_settle).await else {
            return Vec::new();
        };

        let mut links = Vec::new();
        for (rank, set) in CHAPTER_STRATEGIES.iter().enumerate() {
            links = Self::query(session.as_mut(), set)
                .await
                .into_iter()
                .filter(|record| is_chapter_link(record, rank == 0))
                .collect();
            if !links.is_empty() {
                break;
            }
            warn!(strategy = rank, "no chapter links found, trying next query");
        }
        session.release().await;

        let found = links.len();
        let chapters = build_chapter_list(links);
        info!(links = found, chapters = chapters.len(), "chapters discovered");
        chapters
    }

    /// Lists a chapter's page image URLs in reading order.
    pub async fn list_page_images(&self, chapter_url: &str) -> Vec<String> {
        let Some(mut session) = self.open_at(chapter_url, self.reader_settle).await else {
            return Vec::new();
        };

        let mut urls = Vec::new();
        for (rank, set) in PAGE_IMAGE_STRATEGIES.iter().enumerate() {
            urls = Self::query(session.as_mut(), set)
                .await
                .into_iter()
                .map(|record| record.url)
                .filter(|url| url.len() > MIN_IMAGE_URL_LEN)
                .collect();
            if !urls.is_empty() {
                debug!(strategy = rank, found = urls.len(), "page images matched");
                break;
            }
        }
        session.release().await;

        let urls = filter_page_images(urls);
        info!(url = chapter_url, images = urls.len(), "page images discovered");
        urls
    }

    /// Finds the work's cover image on its landing page.
    pub async fn find_cover(&self, manga_url: &str) -> Option<String> {
        let mut session = self.open_at(manga_url, self.landing_settle).await?;

        let mut cover = None;
        for set in COVER_STRATEGIES {
            if let Some(record) = Self::query(session.as_mut(), set).await.into_iter().next() {
                cover = Some(record.url);
                break;
            }
        }
        session.release().await;

        match &cover {
            Some(url) => info!(url = %url, "cover found"),
            None => warn!("no cover image found"),
        }
        cover
    }
}
