//! Page fetching
//!
//! A [`PageFetcher`] executes one tier of the ladder against one URL. The
//! result is classified so the runner knows what to report:
//!
//! | Outcome | Meaning | Circuit breaker |
//! |---------|---------|-----------------|
//! | `Ok(FetchedPage)` | HTML page received | success |
//! | `Transient` | network error, timeout, 408, 429, 5xx | failure |
//! | `Permanent` | other 4xx, non-HTML body | success (the host answered) |
//! | `UnsupportedTier` | this fetcher cannot run the tier | nothing recorded |

use crate::config::UserAgentConfig;
use crate::strategy::{Tier, TierKind};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Upper bound on the per-request timeout of escalated HTTP tiers
const MAX_TIER_TIMEOUT: Duration = Duration::from_secs(60);

/// A page received from a host
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects, used as the base for relative links
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

/// Classified failure of a single fetch attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Worth retrying later or with another tier; counts against host health
    #[error("Transient fetch failure{}: {message}", status_suffix(.status))]
    Transient { status: Option<u16>, message: String },

    /// The host answered, but the page is not usable
    #[error("Permanent fetch failure{}: {message}", status_suffix(.status))]
    Permanent { status: Option<u16>, message: String },

    #[error("Fetcher cannot execute tier {tier}")]
    UnsupportedTier { tier: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transient { status, .. } | FetchError::Permanent { status, .. } => *status,
            FetchError::UnsupportedTier { .. } => None,
        }
    }
}

/// Executes fetch tiers
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, tier: &Tier) -> Result<FetchedPage, FetchError>;
}

/// Builds the HTTP client used by [`HttpFetcher`]
///
/// The user agent reads `CrawlerName/Version (+ContactURL)`. Redirects are
/// followed up to 10 hops; the per-request timeout is set by the tier.
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain-HTTP fetcher
///
/// Runs every `http` tier as a GET request. Higher levels get a longer
/// timeout: `base * (level + 1)`, capped at one minute. `browser` tiers are
/// refused with [`FetchError::UnsupportedTier`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }

    pub fn with_base_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    pub fn timeout_for(&self, tier: &Tier) -> Duration {
        self.base_timeout
            .saturating_mul(tier.level.saturating_add(1))
            .min(MAX_TIER_TIMEOUT)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, tier: &Tier) -> Result<FetchedPage, FetchError> {
        if tier.kind != TierKind::Http {
            return Err(FetchError::UnsupportedTier {
                tier: tier.name.clone(),
            });
        }

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout_for(tier))
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Err(FetchError::Permanent {
                status: Some(status.as_u16()),
                message: format!("not an HTML page ({})", content_type),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| FetchError::Transient {
            status: Some(status.as_u16()),
            message: format!("failed to read body: {}", e),
        })?;

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

fn classify_status(status: StatusCode) -> FetchError {
    let code = status.as_u16();
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        FetchError::Transient {
            status: Some(code),
            message: status.to_string(),
        }
    } else {
        FetchError::Permanent {
            status: Some(code),
            message: status.to_string(),
        }
    }
}

fn classify_send_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient {
            status: None,
            message: "request timed out".to_string(),
        }
    } else if e.is_connect() {
        FetchError::Transient {
            status: None,
            message: format!("connection failed: {}", e),
        }
    } else if e.is_redirect() {
        FetchError::Permanent {
            status: None,
            message: format!("redirect error: {}", e),
        }
    } else if e.is_request() || e.is_body() {
        FetchError::Transient {
            status: None,
            message: e.to_string(),
        }
    } else {
        FetchError::Permanent {
            status: None,
            message: e.to_string(),
        }
    }
}
