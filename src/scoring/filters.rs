use crate::scoring::{path_extension, UrlFilter};
use crate::url::{matches_any, strip_www};
use crate::{ConfigError, ConfigResult};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;
use url::Url;

/// Extensions of pages worth following
const PAGE_EXTENSIONS: &[&str] = &[
    "html", "htm", "xhtml", "shtml", "php", "asp", "aspx", "jsp", "cfm", "cgi",
];

/// Extensions of assets that are never pages
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "bmp", "tif",
    "tiff", "avif", "woff", "woff2", "ttf", "otf", "eot", "pdf", "zip", "gz", "tgz", "bz2",
    "xz", "7z", "rar", "tar", "exe", "dmg", "msi", "apk", "iso", "bin", "mp3", "wav", "ogg",
    "flac", "mp4", "m4v", "webm", "avi", "mov", "mkv", "doc", "docx", "xls", "xlsx", "ppt",
    "pptx", "csv",
];

/// Syntax of `[filters]` URL patterns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternSyntax {
    /// Shell-style: `*` matches any run of characters, `?` a single one
    #[default]
    Glob,
    Regex,
}

/// Counters kept by a [`FilterChain`]
#[derive(Debug, Default)]
pub struct FilterStats {
    total: AtomicU64,
    passed: AtomicU64,
    rejected: AtomicU64,
}

impl FilterStats {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Ordered AND of filters
///
/// Evaluation stops at the first rejecting filter. An empty chain accepts
/// every URL.
pub struct FilterChain {
    filters: Vec<Box<dyn UrlFilter>>,
    rejections: Vec<AtomicU64>,
    stats: FilterStats,
}

impl FilterChain {
    pub fn new(filters: Vec<Box<dyn UrlFilter>>) -> Self {
        let rejections = filters.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            filters,
            rejections,
            stats: FilterStats::default(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Rejection count per filter, in chain order
    pub fn rejections(&self) -> Vec<(&'static str, u64)> {
        self.filters
            .iter()
            .zip(&self.rejections)
            .map(|(f, count)| (f.name(), count.load(Ordering::Relaxed)))
            .collect()
    }

    pub async fn apply(&self, url: &Url) -> bool {
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        for (filter, rejections) in self.filters.iter().zip(&self.rejections) {
            if !filter.apply(url).await {
                rejections.fetch_add(1, Ordering::Relaxed);
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                trace!(url = %url, filter = filter.name(), "Filtered out");
                return false;
            }
        }

        self.stats.passed.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Matches the full URL against glob or regex patterns
///
/// An include filter accepts URLs matching any pattern; an exclude filter
/// rejects them.
pub struct PatternFilter {
    patterns: Vec<Regex>,
    exclude: bool,
}

impl PatternFilter {
    pub fn new<S: AsRef<str>>(
        patterns: &[S],
        syntax: PatternSyntax,
        exclude: bool,
    ) -> ConfigResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                let source = match syntax {
                    PatternSyntax::Glob => glob_to_regex(p),
                    PatternSyntax::Regex => p.to_string(),
                };
                Regex::new(&source)
                    .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self { patterns, exclude })
    }
}

/// Translates a shell-style glob into an anchored regex
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for c in glob.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}

#[async_trait]
impl UrlFilter for PatternFilter {
    fn name(&self) -> &'static str {
        if self.exclude {
            "exclude-pattern"
        } else {
            "pattern"
        }
    }

    async fn apply(&self, url: &Url) -> bool {
        let matched = self.patterns.iter().any(|re| re.is_match(url.as_str()));
        matched != self.exclude
    }
}

/// Allows or blocks hosts by domain pattern
///
/// Hosts are compared www-stripped. A blocked match always rejects; when an
/// allow list is present the host must match it.
pub struct DomainFilter {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl DomainFilter {
    pub fn new(allowed: Vec<String>, blocked: Vec<String>) -> Self {
        Self { allowed, blocked }
    }
}

#[async_trait]
impl UrlFilter for DomainFilter {
    fn name(&self) -> &'static str {
        "domain"
    }

    async fn apply(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        let host = strip_www(&host);

        if matches_any(&self.blocked, host) {
            return false;
        }
        self.allowed.is_empty() || matches_any(&self.allowed, host)
    }
}

/// Accepts page-like paths and rejects asset downloads
///
/// Extensionless paths and known page extensions pass; known asset
/// extensions are rejected. Unrecognised extensions pass.
pub struct ContentTypeFilter;

impl ContentTypeFilter {
    pub fn is_page(url: &Url) -> bool {
        match path_extension(url) {
            None => true,
            Some(ext) if PAGE_EXTENSIONS.contains(&ext.as_str()) => true,
            Some(ext) => !ASSET_EXTENSIONS.contains(&ext.as_str()),
        }
    }
}

#[async_trait]
impl UrlFilter for ContentTypeFilter {
    fn name(&self) -> &'static str {
        "content-type"
    }

    async fn apply(&self, url: &Url) -> bool {
        Self::is_page(url)
    }
}
