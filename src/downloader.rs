//! Concurrent download of a chapter's page images.
//!
//! Pages are fanned out to a fixed number of fetch slots. Each page is
//! independent: an exhausted page is logged and dropped, its siblings are
//! unaffected. Results are returned sorted by their original position.

use crate::fetcher::ImageFetcher;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Image extensions kept as-is in staged file names.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Extension used when a URI carries none or an unknown one.
const FALLBACK_EXTENSION: &str = "jpg";

/// One page image of a chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct PageAsset {
    /// Position within the chapter (1-based). The permanent sort key.
    pub ordinal: u32,

    /// Where the image is served from.
    pub source_uri: String,

    /// Staged file, once downloaded.
    pub local_path: Option<PathBuf>,

    /// Size of the staged file in bytes.
    pub byte_size: Option<u64>,
}

impl PageAsset {
    pub fn new(ordinal: u32, source_uri: impl Into<String>) -> Self {
        Self {
            ordinal,
            source_uri: source_uri.into(),
            local_path: None,
            byte_size: None,
        }
    }

    /// Builds assets for an ordered URI list, numbering from 1.
    pub fn from_uris<I, S>(uris: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        uris.into_iter()
            .enumerate()
            .map(|(idx, uri)| Self::new(idx as u32 + 1, uri))
            .collect()
    }

    pub fn is_materialized(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Returns the extension to stage `uri` under, limited to known image types.
pub fn image_extension(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let last_segment = path.rsplit('/').next().unwrap_or(path);

    let Some((_, ext)) = last_segment.rsplit_once('.') else {
        return FALLBACK_EXTENSION;
    };
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|allowed| **allowed == ext)
        .copied()
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Staged file name for a page: `pagina_<3-digit ordinal>.<ext>`.
pub fn page_file_name(ordinal: u32, uri: &str) -> String {
    format!("pagina_{:03}.{}", ordinal, image_extension(uri))
}

/// Fans page downloads out over a bounded number of concurrent slots.
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    fetcher: ImageFetcher,
    workers: usize,
}

impl DownloadCoordinator {
    pub fn new(fetcher: ImageFetcher, workers: usize) -> Self {
        Self {
            fetcher,
            workers: workers.max(1),
        }
    }

    /// Downloads every page into `dest_dir` and returns the successes,
    /// ordered by ordinal.
    ///
    /// Blocks until every page either succeeded or exhausted its retries.
    pub async fn download_all(
        &self,
        pages: Vec<PageAsset>,
        dest_dir: &Path,
    ) -> std::io::Result<Vec<PageAsset>> {
        tokio::fs::create_dir_all(dest_dir).await?;
        let total = pages.len();

        let mut done: Vec<PageAsset> = futures::stream::iter(pages)
            .map(|page| self.download_one(page, dest_dir))
            .buffer_unordered(self.workers)
            .filter_map(|page| async move { page })
            .collect()
            .await;

        done.sort_by_key(|page| page.ordinal);

        info!(
            downloaded = done.len(),
            total,
            dir = %dest_dir.display(),
            "page downloads finished"
        );
        Ok(done)
    }

    async fn download_one(&self, mut page: PageAsset, dest_dir: &Path) -> Option<PageAsset> {
        let dest = dest_dir.join(page_file_name(page.ordinal, &page.source_uri));

        match self.fetcher.fetch_to_path(&page.source_uri, &dest).await {
            Ok(bytes) => {
                info!(page = page.ordinal, bytes, "downloaded");
                page.local_path = Some(dest);
                page.byte_size = Some(bytes);
                Some(page)
            }
            Err(err) => {
                warn!(page = page.ordinal, url = %page.source_uri, error = %err, "page skipped");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadConfig;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("https://x.org/a/b/001.png"), "png");
        assert_eq!(image_extension("https://x.org/a/002.WEBP?token=1.2"), "webp");
        assert_eq!(image_extension("https://x.org/a/003.jpeg#frag"), "jpeg");
        assert_eq!(image_extension("https://x.org/a/004.avif"), "jpg");
        assert_eq!(image_extension("https://x.org/image/raw"), "jpg");
        assert_eq!(image_extension("https://cdn.x.org/raw"), "jpg");
    }

    #[test]
    fn test_page_file_name() {
        assert_eq!(page_file_name(1, "https://x.org/p.webp"), "pagina_001.webp");
        assert_eq!(page_file_name(42, "https://x.org/p"), "pagina_042.jpg");
        assert_eq!(page_file_name(1234, "https://x.org/p.gif"), "pagina_1234.gif");
    }

    #[test]
    fn test_from_uris_numbers_from_one() {
        let pages = PageAsset::from_uris(["a", "b", "c"]);
        let ordinals: Vec<u32> = pages.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert!(pages.iter().all(|p| !p.is_materialized()));
    }

    #[tokio::test]
    async fn test_failing_item_is_isolated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p/3.png"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 1500]))
            .mount(&server)
            .await;

        let config = DownloadConfig {
            retry_delay_ms: 5,
            ..DownloadConfig::default()
        };
        let coordinator =
            DownloadCoordinator::new(ImageFetcher::new(reqwest::Client::new(), &config), 8);

        let uris: Vec<String> = (1..=10)
            .map(|i| format!("{}/p/{}.png", server.uri(), i))
            .collect();
        let dir = TempDir::new().unwrap();
        let done = coordinator
            .download_all(PageAsset::from_uris(uris), dir.path())
            .await
            .unwrap();

        let ordinals: Vec<u32> = done.iter().map(|p| p.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 4, 5, 6, 7, 8, 9, 10]);
        assert!(done.iter().all(|p| p.byte_size == Some(1500)));
        assert!(dir.path().join("pagina_010.png").exists());
        assert!(!dir.path().join("pagina_003.png").exists());
    }
}
