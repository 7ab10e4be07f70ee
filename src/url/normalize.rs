use crate::url::domain::strip_www;
use crate::UrlError;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Query parameters removed by name during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "fbclid",
    "gclid",
    "dclid",
    "msclkid",
    "yclid",
    "twclid",
    "ttclid",
    "igshid",
    "mc_eid",
    "mc_cid",
    "_ga",
    "_gl",
    "ref",
    "ref_src",
    "source",
    "sessionid",
    "session_id",
    "phpsessid",
    "jsessionid",
    "sid",
];

/// Parameters that identify content; never stripped by the session-value heuristic
const CONTENT_ID_PARAMS: &[&str] = &[
    "id",
    "sku",
    "asin",
    "isbn",
    "upc",
    "ean",
    "product_id",
    "productid",
    "item_id",
    "itemid",
    "pid",
    "article_id",
    "post_id",
    "slug",
    "v",
    "q",
];

/// Navigation and presentation parameters dropped by [`normalize_for_crawl`]
const NAVIGATION_PARAMS: &[&str] = &[
    "page",
    "pg",
    "sort",
    "sort_by",
    "sortby",
    "order",
    "orderby",
    "dir",
    "lang",
    "language",
    "locale",
    "hl",
    "view",
    "display",
    "layout",
    "tab",
    "theme",
    "limit",
    "per_page",
    "perpage",
    "offset",
    "start",
];

static HEX_BLOB: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{16,}$").expect("valid regex"));

static BASE64_BLOB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/_\-]{20,}={0,2}$").expect("valid regex"));

static EMBEDDED_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});

/// Normalizes a URL into its canonical dedup form
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase scheme and host, drop default ports (80/http, 443/https)
/// 3. Remove www. prefix from the host
/// 4. Normalize path:
///    - Collapse repeated slashes
///    - Strip an `/index.html` or `/index.htm` suffix
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment (everything after #)
/// 6. Remove tracking query parameters, and parameters whose value looks like a
///    session identifier unless the name is a content identifier
/// 7. Sort remaining query parameters by name
/// 8. Remove empty query string (trailing ?)
///
/// Normalization is idempotent: `normalize_url(normalize_url(u))` yields the same URL.
///
/// # Examples
///
/// ```
/// use sumi_helm::url::normalize_url;
///
/// let url = normalize_url("HTTP://WWW.EXAMPLE.COM/page/?utm_source=feed#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    // Url::parse already lowercases scheme and host and drops default ports
    let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
    let host = strip_www(&host);
    url.set_host(Some(host))
        .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url, |key, value| {
            !is_tracking_param(key) && !is_session_param(key, value)
        });
        set_query(&mut url, params);
    }

    Ok(url)
}

/// Normalizes a URL for crawl-level content dedup
///
/// Applies [`normalize_url`] and additionally strips navigation and pagination
/// parameters (page, sort, lang, view, ...). The result is lossy and must never
/// be used as a cache key.
pub fn normalize_for_crawl(url_str: &str) -> Result<Url, UrlError> {
    let mut url = normalize_url(url_str)?;

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url, |key, _| !is_navigation_param(key));
        set_query(&mut url, params);
    }

    Ok(url)
}

/// Normalizes a URL path: collapses slashes, strips index pages and trailing slashes
///
/// Index pages are stripped until none is left, so `/a/index.html/index.htm`
/// becomes `/a`.
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    while segments.last().is_some_and(|last| is_index_page(last)) {
        segments.pop();
    }

    format!("/{}", segments.join("/"))
}

fn is_index_page(segment: &str) -> bool {
    segment.eq_ignore_ascii_case("index.html") || segment.eq_ignore_ascii_case("index.htm")
}

/// Keeps the query parameters accepted by `keep` and sorts them by name
///
/// The sort is stable so repeated keys keep their relative order.
fn filter_and_sort_query_params<F>(url: &Url, keep: F) -> Vec<(String, String)>
where
    F: Fn(&str, &str) -> bool,
{
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, value)| keep(key, value))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

fn set_query(url: &mut Url, params: Vec<(String, String)>) {
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    TRACKING_PARAMS.contains(&key.as_str()) || key.starts_with("utm_")
}

/// Checks if a parameter carries a session or identifier blob
///
/// Content identifiers (`id`, `sku`, ...) are kept whatever their value looks like.
fn is_session_param(key: &str, value: &str) -> bool {
    let key = key.to_ascii_lowercase();
    if CONTENT_ID_PARAMS.contains(&key.as_str()) {
        return false;
    }

    looks_like_session_value(value)
}

fn looks_like_session_value(value: &str) -> bool {
    if HEX_BLOB.is_match(value) || EMBEDDED_UUID.is_match(value) {
        return true;
    }

    // Long plain words are not blobs: require a digit or a base64 symbol
    BASE64_BLOB.is_match(value)
        && value
            .chars()
            .any(|c| c.is_ascii_digit() || matches!(c, '+' | '/' | '_' | '-' | '='))
        && value.chars().any(|c| c.is_ascii_alphabetic())
}

fn is_navigation_param(key: &str) -> bool {
    NAVIGATION_PARAMS.contains(&key.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn norm(url: &str) -> String {
        normalize_url(url).unwrap().to_string()
    }

    #[test]
    fn test_case_www_and_trailing_slash_insensitive() {
        assert_eq!(norm("HTTP://WWW.X.com/a/"), norm("http://x.com/a"));
        assert_eq!(norm("http://x.com/a"), "http://x.com/a");
    }

    #[test]
    fn test_scheme_is_preserved() {
        assert_eq!(norm("http://example.com/page"), "http://example.com/page");
        assert_eq!(norm("https://example.com/page"), "https://example.com/page");
    }

    #[test]
    fn test_www_only_stripped_from_registrable_hosts() {
        assert_eq!(norm("https://www.www.com/a"), "https://www.com/a");
        assert_eq!(norm("https://www.com/a"), "https://www.com/a");
    }

    #[test]
    fn test_default_ports_dropped() {
        assert_eq!(norm("http://example.com:80/a"), "http://example.com/a");
        assert_eq!(norm("https://example.com:443/a"), "https://example.com/a");
        assert_eq!(norm("https://example.com:8443/a"), "https://example.com:8443/a");
    }

    #[test]
    fn test_keep_root_slash() {
        assert_eq!(norm("https://example.com"), "https://example.com/");
        assert_eq!(norm("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        assert_eq!(norm("https://example.com/page#section"), "https://example.com/page");
    }

    #[test]
    fn test_index_page_suffix() {
        assert_eq!(norm("https://example.com/docs/index.html"), "https://example.com/docs");
        assert_eq!(norm("https://example.com/docs/INDEX.HTM"), "https://example.com/docs");
        assert_eq!(norm("https://example.com/index.html"), "https://example.com/");
        assert_eq!(
            norm("https://example.com/docs/reindex.html"),
            "https://example.com/docs/reindex.html"
        );
    }

    #[test]
    fn test_multiple_slashes() {
        assert_eq!(
            norm("https://example.com///path//to///page"),
            "https://example.com/path/to/page"
        );
    }

    #[test]
    fn test_remove_tracking_params() {
        assert_eq!(norm("https://example.com/page?utm_source=x"), "https://example.com/page");
        assert_eq!(
            norm("https://example.com/page?keep=yes&utm_medium=email&another=value&fbclid=123"),
            "https://example.com/page?another=value&keep=yes"
        );
        assert_eq!(norm("https://example.com/page?utm_custom=1"), "https://example.com/page");
        assert_eq!(norm("https://example.com/page?GCLID=abc"), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        assert_eq!(norm("https://example.com/page?b=2&a=1"), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_session_like_values_removed() {
        assert_eq!(
            norm("https://example.com/p?token=0123456789abcdef0123&x=1"),
            "https://example.com/p?x=1"
        );
        assert_eq!(
            norm("https://example.com/p?s=123e4567-e89b-12d3-a456-426614174000"),
            "https://example.com/p"
        );
        assert_eq!(
            norm("https://example.com/p?blob=dGhpcyBpcyBhIHRlc3Q9PQ123"),
            "https://example.com/p"
        );
    }

    #[test]
    fn test_content_ids_survive_session_heuristic() {
        assert_eq!(
            norm("https://example.com/p?id=123e4567-e89b-12d3-a456-426614174000"),
            "https://example.com/p?id=123e4567-e89b-12d3-a456-426614174000"
        );
        assert_eq!(
            norm("https://example.com/p?sku=0123456789abcdef0123"),
            "https://example.com/p?sku=0123456789abcdef0123"
        );
    }

    #[test]
    fn test_long_words_are_not_blobs() {
        assert_eq!(
            norm("https://example.com/p?topic=introductiontorustlanguage"),
            "https://example.com/p?topic=introductiontorustlanguage"
        );
    }

    #[test]
    fn test_normalize_for_crawl_strips_navigation() {
        let url = normalize_for_crawl("https://example.com/list?page=3&sort=asc&category=books")
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/list?category=books");
    }

    #[test]
    fn test_normalize_keeps_navigation() {
        assert_eq!(
            norm("https://example.com/list?page=3&category=books"),
            "https://example.com/list?category=books&page=3"
        );
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn test_nested_index_pages_are_stripped() {
        assert_eq!(
            norm("https://example.com/a/index.html/index.html"),
            "https://example.com/a"
        );
        assert_eq!(norm("https://example.com/index.htm/INDEX.HTML/"), "https://example.com/");
        assert_eq!(norm("https://example.com/index.html/a"), "https://example.com/index.html/a");
    }

    #[test]
    fn test_encoded_values_are_idempotent() {
        let once = norm("https://example.com/s?q=rust+%26+tokio&a=x%3Dy");
        assert_eq!(norm(&once), once);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(
            host in "(www\\.)?[a-z]{1,8}\\.(com|org)",
            segments in proptest::collection::vec(
                prop_oneof![
                    "[a-zA-Z0-9._-]{0,6}",
                    Just("index.html".to_string()),
                    Just("INDEX.htm".to_string()),
                ],
                0..5,
            ),
            trailing in any::<bool>(),
            query in proptest::collection::vec(("[a-z_]{1,6}", "[a-zA-Z0-9%+-]{0,24}"), 0..4),
        ) {
            let mut raw = format!("https://{}/{}", host, segments.join("//"));
            if trailing {
                raw.push('/');
            }
            if !query.is_empty() {
                let q: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                raw.push('?');
                raw.push_str(&q.join("&"));
            }

            if let Ok(once) = normalize_url(&raw) {
                let twice = normalize_url(once.as_str()).unwrap();
                prop_assert_eq!(once.as_str(), twice.as_str());
            }
        }
    }
}
