//! URL handling module for Sumi-Helm
//!
//! This module provides URL canonicalisation, crawl-level dedup, domain
//! extraction and wildcard domain matching.

mod domain;
mod matcher;
mod normalize;

use std::collections::HashSet;

// Re-export main functions
pub use domain::{domain_key, extract_domain, is_same_domain, strip_www};
pub use matcher::{matches_any, matches_wildcard};
pub use normalize::{normalize_for_crawl, normalize_url};

/// Removes duplicate URLs while preserving first-seen order
///
/// URLs are compared by their [`normalize_url`] form. The returned strings are
/// the first-seen originals. A URL that cannot be normalized is keyed by its
/// raw text, so it is only dropped when repeated verbatim.
///
/// # Examples
///
/// ```
/// use sumi_helm::url::deduplicate;
///
/// let urls = vec![
///     "https://example.com/a",
///     "https://WWW.example.com/a/",
///     "https://example.com/b",
/// ];
/// assert_eq!(
///     deduplicate(urls),
///     vec!["https://example.com/a".to_string(), "https://example.com/b".to_string()]
/// );
/// ```
pub fn deduplicate<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for url in urls {
        let raw = url.as_ref();
        let key = normalize_url(raw)
            .map(String::from)
            .unwrap_or_else(|_| raw.to_string());

        if seen.insert(key) {
            unique.push(raw.to_string());
        }
    }

    unique
}
