//! Shared HTTP client for page and image requests.

use crate::config::DownloadConfig;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use std::sync::Arc;
use url::Url;

/// Builds the session client used for every request of one run.
///
/// Cookies set by the site, and any seeded from `jar`, are carried across
/// all calls. `referer` is the origin of the work being downloaded; most
/// image hosts reject hotlinked requests without it.
pub fn create_http_client(
    config: &DownloadConfig,
    jar: Arc<Jar>,
    referer: Option<&Url>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Accept",
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        "Accept-Language",
        HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
    );
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

    if let Some(origin) = referer.map(|url| format!("{}/", url.origin().ascii_serialization()))
        && let Ok(value) = HeaderValue::from_str(&origin)
    {
        headers.insert(REFERER, value);
    }

    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .cookie_provider(jar)
        .timeout(config.timeout())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_client_sends_session_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(header("DNT", "1"))
            .and(header("Referer", format!("{}/", server.uri()).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let origin = Url::parse(&format!("{}/title/1-x", server.uri())).unwrap();
        let client =
            create_http_client(&DownloadConfig::default(), Arc::new(Jar::default()), Some(&origin))
                .unwrap();

        let response = client
            .get(format!("{}/page", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_client_carries_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).append_header("Set-Cookie", "sid=42; Path=/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/image"))
            .and(header("Cookie", "sid=42"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client =
            create_http_client(&DownloadConfig::default(), Arc::new(Jar::default()), None).unwrap();
        client
            .get(format!("{}/login", server.uri()))
            .send()
            .await
            .unwrap();
        let response = client
            .get(format!("{}/image", server.uri()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }
}
