use crate::scoring::{path_extension, UrlScorer};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit regex"));

/// Fraction of keywords that occur in the URL, case-insensitively
pub struct KeywordRelevanceScorer {
    keywords: Vec<String>,
}

impl KeywordRelevanceScorer {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl UrlScorer for KeywordRelevanceScorer {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn score(&self, url: &Url) -> f64 {
        if self.keywords.is_empty() {
            return 0.0;
        }
        let haystack = url.as_str().to_lowercase();
        let hits = self
            .keywords
            .iter()
            .filter(|k| haystack.contains(k.as_str()))
            .count();
        hits as f64 / self.keywords.len() as f64
    }
}

/// Prefers URLs whose path depth is close to an optimum
///
/// Scores `1 / (1 + |depth - optimal|)`, where depth counts non-empty path
/// segments.
pub struct PathDepthScorer {
    optimal_depth: usize,
}

impl PathDepthScorer {
    pub fn new(optimal_depth: usize) -> Self {
        Self { optimal_depth }
    }
}

impl UrlScorer for PathDepthScorer {
    fn name(&self) -> &'static str {
        "path-depth"
    }

    fn score(&self, url: &Url) -> f64 {
        let depth = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).count())
            .unwrap_or(0);
        1.0 / (1.0 + depth.abs_diff(self.optimal_depth) as f64)
    }
}

/// Scores by path extension, favouring HTML and extensionless paths
pub struct ContentTypeScorer;

impl ContentTypeScorer {
    fn score_extension(ext: Option<&str>) -> f64 {
        match ext {
            None => 1.0,
            Some("html" | "htm" | "xhtml" | "shtml") => 1.0,
            Some("php" | "asp" | "aspx" | "jsp" | "cfm" | "cgi") => 0.9,
            Some("txt" | "md" | "xml" | "rss" | "atom" | "json") => 0.6,
            Some("pdf" | "doc" | "docx" | "odt" | "rtf") => 0.3,
            Some(
                "css" | "js" | "mjs" | "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico"
                | "woff" | "woff2" | "ttf" | "eot" | "zip" | "gz" | "tar" | "rar" | "7z" | "exe"
                | "dmg" | "iso" | "mp3" | "mp4" | "avi" | "mov" | "webm",
            ) => 0.0,
            Some(_) => 0.5,
        }
    }
}

impl UrlScorer for ContentTypeScorer {
    fn name(&self) -> &'static str {
        "content-type"
    }

    fn score(&self, url: &Url) -> f64 {
        Self::score_extension(path_extension(url).as_deref())
    }
}

/// Decays with the age of the newest year mentioned in the URL
pub struct FreshnessScorer {
    current_year: i32,
}

impl FreshnessScorer {
    pub fn new(current_year: i32) -> Self {
        Self { current_year }
    }

    /// Newest plausible four-digit year in the text
    fn latest_year(text: &str) -> Option<i32> {
        DIGIT_RUN
            .find_iter(text)
            .filter(|m| m.as_str().len() == 4)
            .filter_map(|m| m.as_str().parse::<i32>().ok())
            .filter(|year| (1900..=2099).contains(year))
            .max()
    }
}

impl UrlScorer for FreshnessScorer {
    fn name(&self) -> &'static str {
        "freshness"
    }

    fn score(&self, url: &Url) -> f64 {
        let Some(year) = Self::latest_year(url.as_str()) else {
            return 0.5;
        };

        match self.current_year - year {
            age if age <= 0 => 1.0,
            1 => 0.9,
            2 => 0.7,
            3..=5 => 0.4,
            _ => 0.2,
        }
    }
}

/// Weight-normalised sum of scorers
#[derive(Default)]
pub struct CompositeScorer {
    scorers: Vec<(Box<dyn UrlScorer>, f64)>,
}

impl CompositeScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scorer; non-positive weights are ignored
    pub fn add<S: UrlScorer + 'static>(&mut self, scorer: S, weight: f64) {
        if weight > 0.0 {
            self.scorers.push((Box::new(scorer), weight));
        }
    }

    pub fn with<S: UrlScorer + 'static>(mut self, scorer: S, weight: f64) -> Self {
        self.add(scorer, weight);
        self
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }
}

impl UrlScorer for CompositeScorer {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn score(&self, url: &Url) -> f64 {
        let total_weight: f64 = self.scorers.iter().map(|(_, w)| w).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }

        let weighted: f64 = self
            .scorers
            .iter()
            .map(|(scorer, weight)| scorer.score(url).clamp(0.0, 1.0) * weight)
            .sum();
        weighted / total_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_keyword_fraction() {
        let scorer = KeywordRelevanceScorer::new(["Rust", "async", "tokio", "  "]);
        assert!((scorer.score(&url("https://a.example/rust/async-io")) - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(scorer.score(&url("https://a.example/go")), 0.0);
        assert_eq!(KeywordRelevanceScorer::new(Vec::<String>::new()).score(&url("https://a.example/")), 0.0);
    }

    #[test]
    fn test_path_depth() {
        let scorer = PathDepthScorer::new(2);
        assert_eq!(scorer.score(&url("https://a.example/a/b")), 1.0);
        assert_eq!(scorer.score(&url("https://a.example/a")), 0.5);
        assert_eq!(scorer.score(&url("https://a.example/")), 1.0 / 3.0);
        assert_eq!(scorer.score(&url("https://a.example/a/b/c/d")), 1.0 / 3.0);
    }

    #[test]
    fn test_content_type_table() {
        let scorer = ContentTypeScorer;
        assert_eq!(scorer.score(&url("https://a.example/guide")), 1.0);
        assert_eq!(scorer.score(&url("https://a.example/guide.html")), 1.0);
        assert_eq!(scorer.score(&url("https://a.example/guide.php")), 0.9);
        assert_eq!(scorer.score(&url("https://a.example/guide.pdf")), 0.3);
        assert_eq!(scorer.score(&url("https://a.example/logo.png")), 0.0);
        assert_eq!(scorer.score(&url("https://a.example/thing.weird")), 0.5);
    }

    #[test]
    fn test_freshness_decay() {
        let scorer = FreshnessScorer::new(2024);
        assert_eq!(scorer.score(&url("https://a.example/2024/post")), 1.0);
        assert_eq!(scorer.score(&url("https://a.example/2025/post")), 1.0);
        assert_eq!(scorer.score(&url("https://a.example/2023/post")), 0.9);
        assert_eq!(scorer.score(&url("https://a.example/2022/post")), 0.7);
        assert_eq!(scorer.score(&url("https://a.example/2019/post")), 0.4);
        assert_eq!(scorer.score(&url("https://a.example/2010/post")), 0.2);
        assert_eq!(scorer.score(&url("https://a.example/post")), 0.5);
    }

    #[test]
    fn test_freshness_takes_newest_year() {
        let scorer = FreshnessScorer::new(2024);
        assert_eq!(scorer.score(&url("https://a.example/2010-2023/recap")), 0.9);
        assert_eq!(scorer.score(&url("https://a.example/id/123456")), 0.5);
    }

    #[test]
    fn test_composite_is_weight_normalised() {
        let scorer = CompositeScorer::new()
            .with(PathDepthScorer::new(1), 1.0)
            .with(ContentTypeScorer, 3.0)
            .with(FreshnessScorer::new(2024), 0.0);
        assert_eq!(scorer.len(), 2);

        let score = scorer.score(&url("https://a.example/a/b.png"));
        assert!((score - 0.125).abs() < 1e-9);

        assert_eq!(CompositeScorer::new().score(&url("https://a.example/")), 0.0);
    }
}
