//! Accessor over the markup a server returns, without running scripts.
//!
//! Suitable for sites that render their reader server-side, and for tests.

use super::{ElementRecord, PageSession, SelectorSet, SessionFactory, absolutize};
use crate::error::SessionError;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Opens [`HtmlSession`]s sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct HtmlFactory {
    client: reqwest::Client,
    navigation_timeout: Duration,
}

impl HtmlFactory {
    pub fn new(client: reqwest::Client, navigation_timeout: Duration) -> Self {
        Self {
            client,
            navigation_timeout,
        }
    }
}

#[async_trait]
impl SessionFactory for HtmlFactory {
    fn name(&self) -> &'static str {
        "html"
    }

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError> {
        Ok(Box::new(HtmlSession {
            client: self.client.clone(),
            navigation_timeout: self.navigation_timeout,
            page: None,
        }))
    }
}

/// A loaded document: final URL after redirects plus its markup.
#[derive(Debug)]
struct LoadedPage {
    url: Url,
    markup: String,
}

/// One static page.
#[derive(Debug)]
pub struct HtmlSession {
    client: reqwest::Client,
    navigation_timeout: Duration,
    page: Option<LoadedPage>,
}

impl HtmlSession {
    async fn load(&self, url: &str) -> Result<LoadedPage, SessionError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Navigation {
                url: url.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }

        let final_url = response.url().clone();
        let markup = response.text().await?;
        Ok(LoadedPage {
            url: final_url,
            markup,
        })
    }
}

/// Runs every selector of `set` over `markup`.
///
/// Kept synchronous: the parsed document must not live across an await.
fn select_records(
    markup: &str,
    base: &Url,
    set: &SelectorSet,
) -> Result<Vec<ElementRecord>, SessionError> {
    let document = Html::parse_document(markup);
    let attribute = set.target.attribute();
    let mut records = Vec::new();

    for raw in set.selectors {
        let selector = Selector::parse(raw)
            .map_err(|e| SessionError::Query(format!("invalid selector '{}': {:?}", raw, e)))?;

        for elem in document.select(&selector) {
            let Some(url) = elem
                .value()
                .attr(attribute)
                .and_then(|value| absolutize(Some(base), value))
            else {
                continue;
            };
            let text = elem.text().collect::<String>().trim().to_string();
            records.push(ElementRecord { url, text });
        }
    }

    Ok(records)
}

#[async_trait]
impl PageSession for HtmlSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let page = tokio::time::timeout(self.navigation_timeout, self.load(url))
            .await
            .map_err(|_| SessionError::Timeout {
                url: url.to_string(),
                seconds: self.navigation_timeout.as_secs(),
            })??;

        debug!(url = %page.url, bytes = page.markup.len(), "page loaded");
        self.page = Some(page);
        Ok(())
    }

    async fn wait_settled(&mut self, _duration: Duration) {
        // Served markup is final; nothing renders afterwards.
    }

    async fn evaluate_selector_set(
        &mut self,
        set: &SelectorSet,
    ) -> Result<Vec<ElementRecord>, SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::NoPage)?;
        select_records(&page.markup, &page.url, set)
    }

    async fn release(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Target;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
          <a href="/title/7-x/ch_1"> Chapter 1 </a>
          <a href="https://bato.to/title/7-x/ch_2">Chapter 2</a>
          <a>no target</a>
          <div name="image-items">
            <img src="https://cdn.example/7/001.webp">
            <img src="data:image/gif;base64,R0lGOD">
          </div>
        </body></html>
    "#;

    #[test]
    fn test_select_records_resolves_and_filters() {
        let base = Url::parse("https://bato.to/title/7-x").unwrap();
        let links = SelectorSet::script(&["a"], Target::Href);
        let records = select_records(PAGE, &base, &links).unwrap();
        assert_eq!(
            records,
            vec![
                ElementRecord {
                    url: "https://bato.to/title/7-x/ch_1".to_string(),
                    text: "Chapter 1".to_string(),
                },
                ElementRecord {
                    url: "https://bato.to/title/7-x/ch_2".to_string(),
                    text: "Chapter 2".to_string(),
                },
            ]
        );

        let images = SelectorSet::traversal(&["div[name=\"image-items\"] img"], Target::Src);
        let records = select_records(PAGE, &base, &images).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "https://cdn.example/7/001.webp");
    }

    #[test]
    fn test_invalid_selector_is_query_error() {
        let base = Url::parse("https://bato.to/").unwrap();
        let set = SelectorSet::script(&["a[["], Target::Href);
        assert!(matches!(
            select_records(PAGE, &base, &set),
            Err(SessionError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_query_before_navigate() {
        let factory = HtmlFactory::new(reqwest::Client::new(), Duration::from_secs(5));
        let mut session = factory.open().await.unwrap();
        let set = SelectorSet::script(&["a"], Target::Href);
        assert!(matches!(
            session.evaluate_selector_set(&set).await,
            Err(SessionError::NoPage)
        ));
        session.release().await;
    }

    #[tokio::test]
    async fn test_navigate_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let factory = HtmlFactory::new(reqwest::Client::new(), Duration::from_secs(5));
        let mut session = factory.open().await.unwrap();
        let err = session
            .navigate(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Navigation { .. }));
    }

    #[tokio::test]
    async fn test_navigate_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let factory = HtmlFactory::new(reqwest::Client::new(), Duration::from_millis(100));
        let mut session = factory.open().await.unwrap();
        let err = session
            .navigate(&format!("{}/slow", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
    }
}
