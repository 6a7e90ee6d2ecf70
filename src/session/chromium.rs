//! Headless Chromium accessor using chromiumoxide.
//!
//! Every session launches its own browser process and shuts it down on
//! release, so a wedged page can never leak into the next operation.

use super::{ElementRecord, PageSession, QueryPath, SelectorSet, SessionFactory, absolutize};
use crate::config::DiscoveryConfig;
use crate::error::SessionError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Hides the automation flag some readers check before serving images.
const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Finds a Chromium-family browser binary.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("TANKOBON_CHROMIUM_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in [
        "google-chrome",
        "chromium",
        "chromium-browser",
        "microsoft-edge",
        "msedge",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else if cfg!(windows) {
        &[
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// Launches a browser per session.
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    executable: Option<PathBuf>,
    headless: bool,
    navigation_timeout: Duration,
}

impl ChromiumFactory {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            executable: config.chromium_path.clone(),
            headless: config.headless,
            navigation_timeout: config.navigation_timeout(),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError> {
        let executable = self
            .executable
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| SessionError::Launch("no Chromium or Edge binary found".to_string()))?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled");
        if self.headless {
            builder = builder.new_headless_mode();
        } else {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SessionError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::Launch(e.to_string()))?;

        let events = tokio::spawn(async move {
            // Decode errors for unknown CDP events are not fatal; keep draining.
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                events.abort();
                return Err(SessionError::Launch(e.to_string()));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            events,
            navigation_timeout: self.navigation_timeout,
        }))
    }
}

/// One browser with one tab.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    events: JoinHandle<()>,
    navigation_timeout: Duration,
}

/// Builds the in-page query for a selector set. Reading the DOM property
/// rather than the attribute yields URLs already resolved by the browser.
fn selector_script(set: &SelectorSet) -> String {
    let selectors = serde_json::to_string(set.selectors).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
            const out = [];
            for (const sel of {selectors}) {{
                document.querySelectorAll(sel).forEach(el => {{
                    const url = el.{prop};
                    if (typeof url === 'string' && url) {{
                        out.push({{ url: url, text: (el.textContent || '').trim() }});
                    }}
                }});
            }}
            return out;
        }})()"#,
        selectors = selectors,
        prop = set.target.attribute(),
    )
}

impl ChromiumSession {
    async fn current_url(&self) -> Option<url::Url> {
        let raw = self.page.url().await.ok().flatten()?;
        url::Url::parse(&raw).ok()
    }

    async fn query_script(&self, set: &SelectorSet) -> Result<Vec<ElementRecord>, SessionError> {
        let raw: Vec<ElementRecord> = self
            .page
            .evaluate(selector_script(set))
            .await
            .map_err(|e| SessionError::Query(e.to_string()))?
            .into_value()
            .map_err(|e| SessionError::Query(format!("{e:?}")))?;

        Ok(raw
            .into_iter()
            .filter_map(|r| {
                absolutize(None, &r.url).map(|url| ElementRecord { url, text: r.text })
            })
            .collect())
    }

    async fn query_traversal(
        &self,
        set: &SelectorSet,
    ) -> Result<Vec<ElementRecord>, SessionError> {
        let base = self.current_url().await;
        let mut records = Vec::new();

        for selector in set.selectors {
            let elements = self
                .page
                .find_elements(*selector)
                .await
                .map_err(|e| SessionError::Query(e.to_string()))?;

            for element in elements {
                let Ok(Some(value)) = element.attribute(set.target.attribute()).await else {
                    continue;
                };
                let Some(url) = absolutize(base.as_ref(), &value) else {
                    continue;
                };
                let text = element
                    .inner_text()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                records.push(ElementRecord { url, text });
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let seconds = self.navigation_timeout.as_secs();
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(SessionError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(SessionError::Timeout {
                    url: url.to_string(),
                    seconds,
                });
            }
        }

        if let Err(e) = self.page.evaluate(STEALTH_SCRIPT).await {
            debug!(error = %e, "stealth script failed");
        }
        Ok(())
    }

    async fn wait_settled(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn evaluate_selector_set(
        &mut self,
        set: &SelectorSet,
    ) -> Result<Vec<ElementRecord>, SessionError> {
        match set.path {
            QueryPath::Script => self.query_script(set).await,
            QueryPath::Traversal => self.query_traversal(set).await,
        }
    }

    async fn release(self: Box<Self>) {
        let ChromiumSession {
            mut browser,
            page,
            events,
            ..
        } = *self;

        let _ = page.close().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "browser did not close cleanly");
        }
        let _ = browser.wait().await;
        events.abort();
    }
}
