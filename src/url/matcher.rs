use crate::url::domain::strip_www;

/// Checks if a host matches a domain pattern
///
/// Both sides are lowercased and www-stripped before comparison. Patterns are
/// either an exact domain (`example.com`) or a wildcard (`*.example.com`), which
/// matches the bare domain as well as any subdomain.
///
/// ```
/// use sumi_helm::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "www.example.com"));
/// assert!(matches_wildcard("*.example.com", "api.v2.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let host = host.to_lowercase();
    let host = strip_www(&host);

    match pattern.strip_prefix("*.") {
        Some(base) => {
            let base = strip_www(base);
            host == base
                || host
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => host == strip_www(&pattern),
    }
}

/// Checks if a host matches any of the given domain patterns
pub fn matches_any<S: AsRef<str>>(patterns: &[S], host: &str) -> bool {
    patterns.iter().any(|p| matches_wildcard(p.as_ref(), host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_ignores_www_and_case() {
        assert!(matches_wildcard("example.com", "example.com"));
        assert!(matches_wildcard("example.com", "WWW.Example.com"));
        assert!(matches_wildcard("www.example.com", "example.com"));
    }

    #[test]
    fn test_exact_no_match() {
        assert!(!matches_wildcard("example.com", "other.com"));
        assert!(!matches_wildcard("example.com", "blog.example.com"));
    }

    #[test]
    fn test_wildcard_matches_bare_and_nested() {
        assert!(matches_wildcard("*.example.com", "example.com"));
        assert!(matches_wildcard("*.example.com", "blog.example.com"));
        assert!(matches_wildcard("*.example.com", "deep.nested.example.com"));
    }

    #[test]
    fn test_wildcard_no_partial_label_match() {
        assert!(!matches_wildcard("*.example.com", "myexample.com"));
        assert!(!matches_wildcard("*.example.com", "example.com.org"));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec!["a.example".to_string(), "*.b.example".to_string()];
        assert!(matches_any(&patterns, "www.a.example"));
        assert!(matches_any(&patterns, "cdn.b.example"));
        assert!(!matches_any(&patterns, "c.example"));
        assert!(!matches_any::<String>(&[], "a.example"));
    }
}
