//! Robots.txt handling
//!
//! The crawler fetches robots.txt once per crawl and consults it before every
//! request. A missing, unreadable or failing robots.txt allows everything.

mod parser;

pub use parser::ParsedRobots;

use reqwest::Client;
use url::Url;

/// Fetches robots.txt for the origin of `site`
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `site` - Any URL on the site
///
/// # Returns
///
/// The parsed rules, or [`ParsedRobots::allow_all`] when the file is not
/// available
pub async fn fetch_robots(client: &Client, site: &Url) -> ParsedRobots {
    let Ok(robots_url) = site.join("/robots.txt") else {
        return ParsedRobots::allow_all();
    };

    match client.get(robots_url.as_str()).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => {
                tracing::debug!(url = %robots_url, bytes = body.len(), "robots.txt loaded");
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt unreadable, allowing all");
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            tracing::debug!(url = %robots_url, status = response.status().as_u16(), "no robots.txt, allowing all");
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing all");
            ParsedRobots::allow_all()
        }
    }
}
