/// Checks if a host matches a wildcard pattern
///
/// Supported patterns:
/// 1. `*` matches every host
/// 2. Exact match: "example.com" matches only "example.com"
/// 3. Suffix wildcard: "*.example.com" matches "example.com" and any
///    subdomain of it, however deep
/// 4. Leading-label wildcard: "login.*" matches any host whose first label
///    is "login" ("login.example.com", "login.corp.example.org")
///
/// # Arguments
///
/// * `pattern` - The host pattern
/// * `candidate` - The lowercase host to check
///
/// # Examples
///
/// ```
/// use site_audit::url::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(matches_wildcard("login.*", "login.example.org"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return !candidate.is_empty();
    }

    if let Some(base) = pattern.strip_prefix("*.") {
        return candidate == base || candidate.ends_with(&format!(".{}", base));
    }

    if let Some(label) = pattern.strip_suffix(".*") {
        return candidate
            .split_once('.')
            .map(|(first, rest)| first == label && !rest.is_empty())
            .unwrap_or(false);
    }

    candidate == pattern
}
