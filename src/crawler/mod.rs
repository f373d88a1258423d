//! Site crawling
//!
//! The pipeline talks to the crawler through the [`SiteCrawler`] trait, which
//! yields one [`PageExport`] per fetched page. This module contains:
//! - The trait and its export and error types
//! - HTTP fetching with a descriptive user agent
//! - HTML parsing of titles, meta tags, headings and links
//! - [`HttpCrawler`], a polite breadth-first implementation

mod coordinator;
mod fetcher;
mod parser;

pub use coordinator::HttpCrawler;
pub use fetcher::{build_http_client, fetch_page, FetchResult};
pub use parser::{parse_html, Heading, ParsedPage};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// One page as exported by a crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageExport {
    /// Final URL after redirects
    pub url: String,
    pub status_code: u16,
    /// `Some("")` when the page has an empty `<title>`
    pub title: Option<String>,
    /// Meta tags keyed by lowercased `name` (or `property`)
    pub meta: BTreeMap<String, String>,
    pub headings: Vec<Heading>,
    /// Absolute, normalized links in document order without duplicates
    pub links: Vec<String>,
    pub depth: u32,
}

impl PageExport {
    /// An export for a page that answered with an error status
    pub fn error_page(url: impl Into<String>, status_code: u16, depth: u32) -> Self {
        Self {
            url: url.into(),
            status_code,
            title: None,
            meta: BTreeMap::new(),
            headings: Vec::new(),
            links: Vec::new(),
            depth,
        }
    }

    /// True when the page was fetched successfully and can be analyzed
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Errors raised by a crawl
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Network trouble or a server error; running the stage again may succeed
    #[error("Transient crawl failure: {0}")]
    Transient(String),

    /// The site answered 429
    #[error("Rate limited (HTTP 429) while crawling {0}")]
    RateLimited(String),

    /// The site cannot be crawled at all
    #[error("Crawl failed: {0}")]
    Fatal(String),

    /// The crawl finished without any usable page
    #[error("Crawl produced no usable pages for {0}")]
    NoPages(String),
}

impl CrawlError {
    /// True when the whole stage should be rescheduled with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited(_))
    }
}

/// Crawls a site and exports its pages
#[async_trait]
pub trait SiteCrawler: Send + Sync {
    /// Crawls from `start_url`, exporting at most `max_pages` pages
    async fn crawl(&self, start_url: &Url, max_pages: u32) -> Result<Vec<PageExport>, CrawlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_page_is_not_ok() {
        let page = PageExport::error_page("https://example.com/gone", 404, 1);
        assert!(!page.is_ok());
        assert!(page.links.is_empty());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(CrawlError::Transient("timeout".into()).is_retryable());
        assert!(CrawlError::RateLimited("https://example.com/".into()).is_retryable());
        assert!(!CrawlError::Fatal("dns".into()).is_retryable());
        assert!(!CrawlError::NoPages("https://example.com/".into()).is_retryable());
    }

    #[test]
    fn test_export_roundtrips_through_json() {
        let mut meta = BTreeMap::new();
        meta.insert("description".to_string(), "A page".to_string());
        let page = PageExport {
            url: "https://example.com/".to_string(),
            status_code: 200,
            title: Some(String::new()),
            meta,
            headings: vec![Heading {
                level: 1,
                text: "Welcome".to_string(),
            }],
            links: vec!["https://example.com/about".to_string()],
            depth: 0,
        };

        let json = serde_json::to_string(&page).unwrap();
        let back: PageExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, page);
    }
}
