//! Browser session used by the agent
//!
//! The agent only needs to navigate and read pages. `HttpBrowser` does that
//! with plain HTTP fetches; the backend chosen at provisioning time only
//! changes how the session identifies itself.

use async_trait::async_trait;
use parking_lot::Mutex;
use pilot_foundation::{Error, Result};
use pilot_task::BrowserBackend;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Longest page text kept per page
const MAX_PAGE_TEXT: usize = 8_000;

/// What the agent currently sees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub text: String,
}

impl PageState {
    /// Page text cut to `limit` characters
    pub fn excerpt(&self, limit: usize) -> String {
        if self.text.chars().count() <= limit {
            return self.text.clone();
        }
        let mut cut: String = self.text.chars().take(limit).collect();
        cut.push_str(" ...");
        cut
    }
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and make it the current page
    async fn navigate(&self, url: &str) -> Result<PageState>;

    /// Current page; empty before the first navigation
    fn current_page(&self) -> Option<PageState>;

    fn current_url(&self) -> Option<String> {
        self.current_page().map(|p| p.url)
    }
}

struct Patterns {
    title: Regex,
    noise: Regex,
    tags: Regex,
    space: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        let compile = |p: &str| Regex::new(p).map_err(|e| Error::Internal(e.to_string()));
        Ok(Self {
            title: compile(r"(?is)<title[^>]*>(.*?)</title>")?,
            noise: compile(r"(?is)<(script|style|noscript|head)[^>]*>.*?</(script|style|noscript|head)>")?,
            tags: compile(r"(?s)<[^>]+>")?,
            space: compile(r"\s+")?,
        })
    }

    fn title(&self, html: &str) -> String {
        self.title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| self.collapse(m.as_str()))
            .unwrap_or_default()
    }

    fn text(&self, html: &str) -> String {
        let without_noise = self.noise.replace_all(html, " ");
        let without_tags = self.tags.replace_all(&without_noise, " ");
        let decoded = without_tags
            .replace("&nbsp;", " ")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'");
        let text = self.collapse(&decoded);
        text.chars().take(MAX_PAGE_TEXT).collect()
    }

    fn collapse(&self, s: &str) -> String {
        self.space.replace_all(s, " ").trim().to_string()
    }
}

/// Page reader over plain HTTP
pub struct HttpBrowser {
    client: Client,
    patterns: Patterns,
    page: Mutex<Option<PageState>>,
}

impl HttpBrowser {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            client,
            patterns: Patterns::compile()?,
            page: Mutex::new(None),
        })
    }

    /// Session for a provisioned backend
    pub fn for_backend(backend: &BrowserBackend) -> Result<Self> {
        let user_agent = match backend {
            BrowserBackend::Remote(session) => {
                debug!("Remote session {} reads pages over HTTP", session.session_id);
                format!("pilot/{} (remote; {})", env!("CARGO_PKG_VERSION"), session.session_id)
            }
            BrowserBackend::Local(local) if local.headless => {
                format!("pilot/{} (headless)", env!("CARGO_PKG_VERSION"))
            }
            BrowserBackend::Local(_) => format!("pilot/{}", env!("CARGO_PKG_VERSION")),
        };
        Self::new(Duration::from_secs(30), &user_agent)
    }

    /// Parse a fetched document into a page
    pub fn read(&self, url: &str, html: &str) -> PageState {
        PageState {
            url: url.to_string(),
            title: self.patterns.title(html),
            text: self.patterns.text(html),
        }
    }
}

#[async_trait]
impl BrowserSession for HttpBrowser {
    async fn navigate(&self, url: &str) -> Result<PageState> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let final_url = response.url().to_string();
        let status = response.status();
        let html = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Http(format!("HTTP {} for {}", status, final_url)));
        }

        let page = self.read(&final_url, &html);
        *self.page.lock() = Some(page.clone());
        Ok(page)
    }

    fn current_page(&self) -> Option<PageState> {
        self.page.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_task::LocalBrowser;

    #[test]
    fn test_read_strips_markup() {
        let browser = HttpBrowser::for_backend(&BrowserBackend::Local(LocalBrowser::default())).unwrap();
        let html = r#"<html><head><title> Example
            Domain </title><style>p { color: red }</style></head>
            <body><script>var x = 1;</script><h1>Example</h1>
            <p>Fish &amp; chips</p></body></html>"#;

        let page = browser.read("https://example.com/", html);
        assert_eq!(page.title, "Example Domain");
        assert_eq!(page.text, "Example Fish & chips");
        assert!(browser.current_page().is_none());
    }

    #[test]
    fn test_excerpt() {
        let page = PageState {
            text: "abcdef".into(),
            ..PageState::default()
        };
        assert_eq!(page.excerpt(10), "abcdef");
        assert_eq!(page.excerpt(3), "abc ...");
    }
}
