//! Rendered-page accessors.
//!
//! Discovery never touches a browser or an HTML parser directly. It works
//! against [`PageSession`], a single stateful page that can be navigated,
//! given time to settle, and queried with a [`SelectorSet`]. Sessions are
//! opened through a [`SessionFactory`] and released after every operation;
//! they are never shared between concurrent callers.

#[cfg(feature = "chromium")]
mod chromium;
mod html;

#[cfg(feature = "chromium")]
pub use chromium::{ChromiumFactory, ChromiumSession, find_chromium};
pub use html::{HtmlFactory, HtmlSession};

use crate::error::SessionError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Element property read by a selector set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Link destination (`href`).
    Href,
    /// Image source (`src`).
    Src,
}

impl Target {
    pub const fn attribute(self) -> &'static str {
        match self {
            Target::Href => "href",
            Target::Src => "src",
        }
    }
}

/// How a selector set is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryPath {
    /// Inside the page's scripting environment (sees resolved properties).
    Script,
    /// Through the accessor's own element traversal API.
    Traversal,
}

/// A declarative page query: CSS selectors plus the property to read.
///
/// Results of all selectors are concatenated in selector order, each
/// selector's matches in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSet {
    pub selectors: &'static [&'static str],
    pub target: Target,
    pub path: QueryPath,
}

impl SelectorSet {
    pub const fn script(selectors: &'static [&'static str], target: Target) -> Self {
        Self {
            selectors,
            target,
            path: QueryPath::Script,
        }
    }

    pub const fn traversal(selectors: &'static [&'static str], target: Target) -> Self {
        Self {
            selectors,
            target,
            path: QueryPath::Traversal,
        }
    }
}

/// One matched element.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ElementRecord {
    /// Absolute URL read from the element's target property.
    pub url: String,
    /// Trimmed text content.
    pub text: String,
}

/// A single rendered page.
#[async_trait]
pub trait PageSession: Send {
    /// Loads `url`, replacing the current page.
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Gives client-side rendering a fixed amount of time to finish.
    async fn wait_settled(&mut self, duration: Duration);

    /// Evaluates a selector set against the current page.
    async fn evaluate_selector_set(
        &mut self,
        set: &SelectorSet,
    ) -> Result<Vec<ElementRecord>, SessionError>;

    /// Tears the session down. The session must not be used afterwards.
    async fn release(self: Box<Self>);
}

/// Opens fresh page sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError>;
}

/// Resolves `raw` against `base`, keeping only http(s) results.
pub(crate) fn absolutize(base: Option<&url::Url>, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }

    let resolved = match url::Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok()?,
        Err(_) => return None,
    };

    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
