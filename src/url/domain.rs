use url::Url;

/// Second-level labels under which registrations happen one level deeper
/// (`example.co.uk` rather than `co.uk`).
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "ac", "co", "com", "edu", "gov", "ltd", "me", "net", "nic", "org", "plc", "sch",
];

/// Hosting suffixes whose subdomains belong to different owners, so
/// `alice.github.io` and `bob.github.io` are separate registrable domains
const HOSTING_SUFFIXES: &[&str] = &[
    "appspot.com",
    "azurewebsites.net",
    "blogspot.com",
    "cloudfront.net",
    "github.io",
    "gitlab.io",
    "herokuapp.com",
    "netlify.app",
    "pages.dev",
    "vercel.app",
];

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Arguments
///
/// * `url` - The URL to extract the domain from
///
/// # Returns
///
/// * `Some(String)` - The lowercase domain/host
/// * `None` - If the URL has no host
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_audit::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the registrable domain of a host
///
/// The registrable domain is the last two labels of the host, or the last
/// three when the second-to-last label is a common second-level suffix under
/// a two-letter country code (`bbc.co.uk`, `abc.net.au`). Under a hosting
/// suffix such as `github.io` the label in front of the suffix is kept too.
/// IP addresses and single-label hosts are returned unchanged.
///
/// # Examples
///
/// ```
/// use site_audit::url::registrable_domain;
///
/// assert_eq!(registrable_domain("blog.example.com"), "example.com");
/// assert_eq!(registrable_domain("news.bbc.co.uk"), "bbc.co.uk");
/// assert_eq!(registrable_domain("docs.alice.github.io"), "alice.github.io");
/// assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
/// ```
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
        return host;
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();

    if let Some(suffix) = HOSTING_SUFFIXES
        .iter()
        .find(|suffix| host.ends_with(&format!(".{}", suffix)))
    {
        let keep = suffix.split('.').count() + 1;
        if labels.len() >= keep {
            return labels[labels.len() - keep..].join(".");
        }
    }

    if labels.len() <= 2 {
        return labels.join(".");
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let keep = if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
        3
    } else {
        2
    };

    labels[labels.len() - keep..].join(".")
}

/// Returns the registrable domain for a URL string, if it has a host
pub fn registrable_domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str().map(registrable_domain)
}
