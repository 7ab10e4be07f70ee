//! Link extraction from fetched HTML

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use url::Url;

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static BASE: Lazy<Selector> = Lazy::new(|| Selector::parse("base[href]").expect("valid selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel='canonical'][href]").expect("valid selector"));

const SKIPPED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Title and outgoing links of a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: Option<String>,
    /// Absolute http(s) links in document order, canonical link last
    pub links: Vec<String>,
    pub canonical: Option<String>,
}

/// Parses an HTML document fetched from `page_url`
///
/// Relative links resolve against `<base href>` when present, otherwise
/// against the page URL. `<a download>` anchors, fragment-only hrefs and
/// `javascript:`, `mailto:`, `tel:` and `data:` links are dropped;
/// `rel="nofollow"` links are kept. Links are not deduplicated here.
///
/// ```
/// use sumi_helm::crawler::parse_html;
/// use url::Url;
///
/// let page = Url::parse("https://example.com/docs/").unwrap();
/// let parsed = parse_html(r#"<title>Docs</title><a href="intro">Intro</a>"#, &page);
/// assert_eq!(parsed.title.as_deref(), Some("Docs"));
/// assert_eq!(parsed.links, vec!["https://example.com/docs/intro"]);
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    let base = document_base(&document, page_url);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut links: Vec<String> = document
        .select(&ANCHOR)
        .filter(|a| a.value().attr("download").is_none())
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_link(href, &base))
        .collect();

    let canonical = document
        .select(&CANONICAL)
        .filter_map(|l| l.value().attr("href"))
        .find_map(|href| resolve_link(href, &base));
    if let Some(canonical) = &canonical {
        links.push(canonical.clone());
    }

    ParsedPage {
        title,
        links,
        canonical,
    }
}

fn document_base(document: &Html, page_url: &Url) -> Url {
    document
        .select(&BASE)
        .next()
        .and_then(|b| b.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .filter(|base| matches!(base.scheme(), "http" | "https"))
        .unwrap_or_else(|| page_url.clone())
}

fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
