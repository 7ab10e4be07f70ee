use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_helm::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Strips leading `www.` labels from a lowercase host
///
/// A label is only stripped while the remainder still contains a dot, so
/// `www.com` stays as is and the result is stable under repeated application.
pub fn strip_www(host: &str) -> &str {
    let mut host = host;
    while let Some(rest) = host.strip_prefix("www.") {
        if !rest.contains('.') {
            break;
        }
        host = rest;
    }
    host
}

/// Returns the bare domain used to key per-domain state
///
/// This is the lowercase, www-stripped host. Circuit breaker and strategy
/// memory bookkeeping is keyed by this value, never by the full URL.
///
/// ```
/// use url::Url;
/// use sumi_helm::url::domain_key;
///
/// let url = Url::parse("https://WWW.Example.com:8080/a?b=c").unwrap();
/// assert_eq!(domain_key(&url), Some("example.com".to_string()));
/// ```
pub fn domain_key(url: &Url) -> Option<String> {
    extract_domain(url).map(|host| strip_www(&host).to_string())
}

/// Checks whether two hosts name the same site once `www.` is ignored
pub fn is_same_domain(host: &str, base_domain: &str) -> bool {
    strip_www(&host.to_lowercase()) == strip_www(&base_domain.to_lowercase())
}
