//! Polite breadth-first site crawler
//!
//! One crawl:
//! 1. Fetches robots.txt for the start URL's origin
//! 2. Fetches the start page; failures here decide whether the crawl is
//!    transient, rate limited or fatal
//! 3. Walks same-site links breadth-first until the page or depth limit
//!    is reached, waiting between requests

use crate::checker::NetworkErrorKind;
use crate::config::{Config, CrawlerConfig};
use crate::crawler::{build_http_client, fetch_page, parse_html, CrawlError, FetchResult, PageExport, SiteCrawler};
use crate::robots::{fetch_robots, ParsedRobots};
use crate::url::{extract_domain, is_same_site};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use url::Url;

/// Crawler fetching pages over HTTP
pub struct HttpCrawler {
    client: Client,
    /// Product token matched against robots.txt groups
    agent_token: String,
    config: CrawlerConfig,
}

impl HttpCrawler {
    pub fn new(client: Client, agent_token: impl Into<String>, config: CrawlerConfig) -> Self {
        Self {
            client,
            agent_token: agent_token.into(),
            config,
        }
    }

    /// Builds a crawler with its own client from the configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.crawler.request_timeout())?;
        Ok(Self::new(
            client,
            config.user_agent.crawler_name.clone(),
            config.crawler.clone(),
        ))
    }

    fn politeness_delay(&self, robots: &ParsedRobots) -> Duration {
        let configured = self.config.politeness_delay();
        robots
            .crawl_delay(&self.agent_token)
            .map_or(configured, |requested| requested.max(configured))
    }
}

/// Maps a failed start page to a crawl error
fn start_page_error(url: &str, result: FetchResult) -> CrawlError {
    match result {
        FetchResult::HttpError { status_code: 429, .. } => CrawlError::RateLimited(url.to_string()),
        FetchResult::HttpError { status_code, .. } if status_code >= 500 => {
            CrawlError::Transient(format!("HTTP {} server error from {}", status_code, url))
        }
        FetchResult::HttpError { status_code, .. } => {
            CrawlError::Fatal(format!("HTTP {} for start page {}", status_code, url))
        }
        FetchResult::NonHtml { content_type, .. } => {
            CrawlError::Fatal(format!("start page {} is {}, not HTML; no usable content", url, content_type))
        }
        FetchResult::NetworkError { error, kind } => match kind {
            NetworkErrorKind::Dns => CrawlError::Fatal(format!("DNS lookup failed for {}: {}", url, error)),
            NetworkErrorKind::Tls => {
                CrawlError::Fatal(format!("TLS certificate error for {}: {}", url, error))
            }
            NetworkErrorKind::Redirect => {
                CrawlError::Fatal(format!("too many redirects for {}: {}", url, error))
            }
            NetworkErrorKind::Timeout => {
                CrawlError::Transient(format!("request timed out for {}: {}", url, error))
            }
            NetworkErrorKind::Connect | NetworkErrorKind::Other => {
                CrawlError::Transient(format!("connection to {} failed: {}", url, error))
            }
        },
        FetchResult::Page { .. } => CrawlError::NoPages(url.to_string()),
    }
}

#[async_trait]
impl SiteCrawler for HttpCrawler {
    async fn crawl(&self, start_url: &Url, max_pages: u32) -> Result<Vec<PageExport>, CrawlError> {
        let site_host = extract_domain(start_url)
            .ok_or_else(|| CrawlError::Fatal(format!("{} has no host", start_url)))?;

        let robots = fetch_robots(&self.client, start_url).await;
        if !robots.is_allowed(start_url.as_str(), &self.agent_token) {
            return Err(CrawlError::Fatal(format!(
                "robots.txt disallows crawling {}",
                start_url
            )));
        }
        let delay = self.politeness_delay(&robots);

        let mut frontier: VecDeque<(String, u32)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        frontier.push_back((start_url.to_string(), 0));
        visited.insert(start_url.to_string());

        let mut exports: Vec<PageExport> = Vec::new();
        let mut requests = 0usize;

        while let Some((url, depth)) = frontier.pop_front() {
            if exports.len() >= max_pages as usize {
                break;
            }
            if !robots.is_allowed(&url, &self.agent_token) {
                tracing::debug!(url = %url, "disallowed by robots.txt");
                continue;
            }

            if requests > 0 {
                tokio::time::sleep(delay).await;
            }
            requests += 1;

            let result = fetch_page(&self.client, &url).await;
            let is_start = depth == 0 && exports.is_empty();

            match result {
                FetchResult::Page {
                    final_url,
                    status_code,
                    body,
                } => {
                    visited.insert(final_url.clone());
                    let base = Url::parse(&final_url).map_err(|e| CrawlError::Fatal(e.to_string()))?;
                    let parsed = parse_html(&body, &base);

                    if depth < self.config.max_depth {
                        for link in &parsed.links {
                            let Ok(link_url) = Url::parse(link) else {
                                continue;
                            };
                            let same_site = extract_domain(&link_url)
                                .is_some_and(|host| is_same_site(&host, &site_host));
                            if same_site && visited.insert(link.clone()) {
                                frontier.push_back((link.clone(), depth + 1));
                            }
                        }
                    }

                    tracing::debug!(url = %final_url, depth, links = parsed.links.len(), "page crawled");
                    exports.push(PageExport {
                        url: final_url,
                        status_code,
                        title: parsed.title,
                        meta: parsed.meta,
                        headings: parsed.headings,
                        links: parsed.links,
                        depth,
                    });
                }
                FetchResult::HttpError { status_code: 429, .. } => {
                    tracing::warn!(url = %url, "site is rate limiting the crawl");
                    return Err(CrawlError::RateLimited(url));
                }
                other if is_start => return Err(start_page_error(&url, other)),
                FetchResult::HttpError {
                    final_url,
                    status_code,
                } => {
                    tracing::debug!(url = %final_url, status_code, "page answered with an error");
                    exports.push(PageExport::error_page(final_url, status_code, depth));
                }
                FetchResult::NonHtml { final_url, content_type, .. } => {
                    tracing::debug!(url = %final_url, content_type = %content_type, "skipping non-HTML page");
                }
                FetchResult::NetworkError { error, .. } => {
                    tracing::debug!(url = %url, error = %error, "page fetch failed");
                }
            }
        }

        if !exports.iter().any(PageExport::is_ok) {
            return Err(CrawlError::NoPages(start_url.to_string()));
        }

        tracing::info!(
            pages = exports.len(),
            requests,
            start = %start_url,
            "crawl finished"
        );
        Ok(exports)
    }
}
