//! HTTP fetcher
//!
//! Builds the shared HTTP clients and fetches crawl pages, sorting every
//! response into a [`FetchResult`].

use crate::checker::NetworkErrorKind;
use crate::config::UserAgentConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// Result of a page fetch
#[derive(Debug)]
pub enum FetchResult {
    /// An HTML page with a 2xx status
    Page {
        /// Final URL after redirects
        final_url: String,
        status_code: u16,
        body: String,
    },

    /// A 2xx response that is not HTML
    NonHtml {
        final_url: String,
        status_code: u16,
        content_type: String,
    },

    /// A response with a non-2xx status
    HttpError { final_url: String, status_code: u16 },

    /// No response at all
    NetworkError {
        error: String,
        kind: NetworkErrorKind,
    },
}

/// Builds an HTTP client identifying itself with the configured user agent
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total timeout per request
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use site_audit::config::UserAgentConfig;
/// use site_audit::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "SiteAudit".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page and classifies the response
///
/// | Response | Result |
/// |----------|--------|
/// | 2xx with `text/html` (or no Content-Type) | `Page` |
/// | 2xx with another Content-Type | `NonHtml` |
/// | any other status | `HttpError` |
/// | no response | `NetworkError` |
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let kind = crate::checker::network_error_kind(&e);
            return FetchResult::NetworkError {
                error: e.to_string(),
                kind,
            };
        }
    };

    let status_code = response.status().as_u16();
    let final_url = response.url().to_string();

    if !response.status().is_success() {
        return FetchResult::HttpError {
            final_url,
            status_code,
        };
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    if !content_type.is_empty() && !content_type.contains("text/html") {
        return FetchResult::NonHtml {
            final_url,
            status_code,
            content_type,
        };
    }

    match response.text().await {
        Ok(body) => FetchResult::Page {
            final_url,
            status_code,
            body,
        },
        Err(e) => {
            let kind = crate::checker::network_error_kind(&e);
            FetchResult::NetworkError {
                error: e.to_string(),
                kind,
            }
        }
    }
}
