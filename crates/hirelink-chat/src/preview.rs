//! Link-preview resolution for message enrichment.
//!
//! The pipeline scans outgoing text for the first URL and, when one is
//! found, fetches the page and scrapes its title and Open Graph tags.
//! Failures never block a send: the message simply goes out without a
//! preview.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use hirelink_shared::{constants::LINK_PREVIEW_TIMEOUT_SECS, ChatError, ChatResult};
use hirelink_store::Preview;

/// Pull the first http(s) URL out of a message body, if any.
pub fn extract_first_url(text: &str) -> Option<&str> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap());
    re.find(text).map(|m| m.as_str())
}

#[async_trait]
pub trait LinkPreviewResolver: Send + Sync {
    async fn fetch(&self, url: &str) -> ChatResult<Preview>;
}

/// Scrapes `<title>` and Open Graph description/image from the page.
pub struct HttpPreviewResolver {
    client: reqwest::Client,
    title_re: Regex,
    description_re: Regex,
    image_re: Regex,
}

impl HttpPreviewResolver {
    pub fn new() -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LINK_PREVIEW_TIMEOUT_SECS))
            .build()
            .map_err(|e| ChatError::External(format!("http client: {e}")))?;
        Ok(Self {
            client,
            title_re: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")
                .map_err(|e| ChatError::External(e.to_string()))?,
            description_re: meta_content_re("og:description")?,
            image_re: meta_content_re("og:image")?,
        })
    }

    fn scrape(&self, url: &str, html: &str) -> Preview {
        let first_capture = |re: &Regex| {
            re.captures(html)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_default()
        };
        Preview {
            url: url.to_string(),
            title: first_capture(&self.title_re),
            description: first_capture(&self.description_re),
            image: first_capture(&self.image_re),
        }
    }
}

fn meta_content_re(property: &str) -> ChatResult<Regex> {
    let pattern = format!(
        r#"(?is)<meta[^>]+property\s*=\s*["']{property}["'][^>]+content\s*=\s*["']([^"']*)["']"#
    );
    Regex::new(&pattern).map_err(|e| ChatError::External(e.to_string()))
}

#[async_trait]
impl LinkPreviewResolver for HttpPreviewResolver {
    async fn fetch(&self, url: &str) -> ChatResult<Preview> {
        debug!(url, "fetching link preview");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ChatError::External(format!("preview fetch: {e}")))?;
        let html = response
            .text()
            .await
            .map_err(|e| ChatError::External(format!("preview body: {e}")))?;
        Ok(self.scrape(url, &html))
    }
}

/// Resolver that always fails, for tests exercising the degraded path.
pub struct NoopPreviewResolver;

#[async_trait]
impl LinkPreviewResolver for NoopPreviewResolver {
    async fn fetch(&self, _url: &str) -> ChatResult<Preview> {
        Err(ChatError::External("preview resolution disabled".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_url() {
        assert_eq!(
            extract_first_url("see https://example.com/a and http://b.io"),
            Some("https://example.com/a")
        );
        assert_eq!(extract_first_url("no links here"), None);
    }

    #[test]
    fn scrapes_title_and_og_tags() {
        let html = r#"<html><head>
            <title> Example Page </title>
            <meta property="og:description" content="A description" />
            <meta property="og:image" content="https://example.com/img.png" />
        </head></html>"#;
        let resolver = HttpPreviewResolver::new().unwrap();
        let preview = resolver.scrape("https://example.com", html);
        assert_eq!(preview.title, "Example Page");
        assert_eq!(preview.description, "A description");
        assert_eq!(preview.image, "https://example.com/img.png");
    }

    #[test]
    fn missing_tags_scrape_to_empty() {
        let resolver = HttpPreviewResolver::new().unwrap();
        let preview = resolver.scrape("https://example.com", "<html></html>");
        assert_eq!(preview.url, "https://example.com");
        assert!(preview.title.is_empty());
        assert!(preview.description.is_empty());
        assert!(preview.image.is_empty());
    }

    #[tokio::test]
    async fn noop_resolver_fails() {
        assert!(NoopPreviewResolver.fetch("https://example.com").await.is_err());
    }
}
