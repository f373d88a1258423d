//! URL handling module for Site-Audit
//!
//! This module provides audit target validation, link normalization,
//! registrable-domain extraction, same-site checks and host pattern matching.

mod domain;
mod matcher;
mod normalize;

use crate::{UrlError, UrlResult};
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, registrable_domain, registrable_domain_of};
pub use matcher::matches_wildcard;
pub use normalize::normalize_url;

/// Validates and canonicalizes a user-supplied audit target
///
/// # Rules
///
/// - Surrounding whitespace is ignored
/// - A missing scheme defaults to `https://`
/// - Only `http` and `https` are accepted
/// - The host must contain at least one dot, must not start or end with a
///   dot, and may only contain ASCII letters, digits, dots and hyphens
///
/// # Arguments
///
/// * `input` - The URL as submitted
///
/// # Returns
///
/// * `Ok(Url)` - The parsed target with its fragment removed
/// * `Err(UrlError)` - The input is not an auditable URL
///
/// # Examples
///
/// ```
/// use site_audit::url::validate_target_url;
///
/// let url = validate_target_url("example.com/about").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about");
/// assert!(validate_target_url("ftp://example.com").is_err());
/// assert!(validate_target_url("https://localhost/").is_err());
/// ```
pub fn validate_target_url(input: &str) -> UrlResult<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Malformed("URL is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut url = Url::parse(&candidate).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingDomain)?;

    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(UrlError::Malformed(format!(
            "Host '{}' contains invalid characters",
            host
        )));
    }

    if !host.contains('.') || host.starts_with('.') || host.ends_with('.') {
        return Err(UrlError::Malformed(format!(
            "Host '{}' is not a fully qualified domain",
            host
        )));
    }

    url.set_fragment(None);
    Ok(url)
}

/// Returns true when `host` belongs to the site rooted at `site_host`
///
/// The site covers its own host, the host without a leading `www.`, and every
/// subdomain of that root.
///
/// # Examples
///
/// ```
/// use site_audit::url::is_same_site;
///
/// assert!(is_same_site("blog.example.com", "www.example.com"));
/// assert!(is_same_site("example.com", "www.example.com"));
/// assert!(!is_same_site("example.org", "example.com"));
/// ```
pub fn is_same_site(host: &str, site_host: &str) -> bool {
    let root = site_host.strip_prefix("www.").unwrap_or(site_host);
    host == site_host || matches_wildcard(&format!("*.{}", root), host)
}
