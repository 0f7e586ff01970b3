//! Runtime settings for the pipeline.
//!
//! Settings come from three layers, lowest precedence first:
//! 1. Built-in defaults ([`Settings::default`])
//! 2. An optional YAML file (`--config settings.yaml`)
//! 3. Individual CLI flags / environment variables (see [`crate::cli::Cli`])
//!
//! # Example file
//!
//! ```yaml
//! page_size: 10
//! batch_deadline_secs: 20
//! publish_timeout_secs: 5
//! exchange: consent.direct
//! routing_key: datain
//! detach_abandoned: false
//! profiles:
//!   search:
//!     host: www.google.com
//!     headers:
//!       Accept-Language: en-GB,en;q=0.5
//! ```
//!
//! Any key left out of the file keeps its default.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument};

/// Search URL with `{site}` and `{offset}` placeholders.
pub const DEFAULT_SEARCH_URL: &str =
    "https://www.google.com/search?q=site:{site}&tbm=nws&source=lnt&tbs=qdr:d&start={offset}";

/// Consent cookie that skips the search engine's cookie wall.
pub const DEFAULT_CONSENT_COOKIE: &str = "CONSENT=YES+cb.20220403-18-p0.en+FX+489";

/// Headers, and an optional `Host` override, sent with one kind of request.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeaderProfile {
    pub host: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl HeaderProfile {
    fn browser(host: Option<&str>) -> Self {
        let headers = [
            (
                "User-Agent",
                "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0",
            ),
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
            ("TE", "trailers"),
            ("Accept-Language", "en-GB,en;q=0.5"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Content-Type", "text/html; charset=utf-8"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            host: host.map(String::from),
            headers,
        }
    }
}

/// The two header profiles: one for the results page, one for articles.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HeaderProfiles {
    pub search: HeaderProfile,
    pub article: HeaderProfile,
}

impl Default for HeaderProfiles {
    fn default() -> Self {
        Self {
            search: HeaderProfile::browser(Some("www.google.com")),
            article: HeaderProfile::browser(None),
        }
    }
}

/// Every tunable of a job.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Results per search page; also the offset step.
    pub page_size: usize,
    /// How long the driver waits on one batch before moving on.
    pub batch_deadline_secs: u64,
    /// Upper bound on a single publish.
    pub publish_timeout_secs: u64,
    /// Transport timeout for each HTTP request.
    pub request_timeout_secs: u64,
    /// Status code that means "stop asking".
    pub rejection_status: u16,
    /// Leave timed-out article tasks running instead of cancelling them.
    pub detach_abandoned: bool,
    pub search_url: String,
    pub consent_cookie: String,
    pub exchange: String,
    pub routing_key: String,
    pub profiles: HeaderProfiles,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_size: 10,
            batch_deadline_secs: 20,
            publish_timeout_secs: 5,
            request_timeout_secs: 30,
            rejection_status: 429,
            detach_abandoned: false,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            consent_cookie: DEFAULT_CONSENT_COOKIE.to_string(),
            exchange: "consent.direct".to_string(),
            routing_key: "datain".to_string(),
            profiles: HeaderProfiles::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file, filling gaps with defaults.
    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        info!(path, "Loaded settings file");
        Ok(settings)
    }

    /// Parse settings from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Build the results page URL for `site` at `offset`.
    pub fn search_url_for(&self, site: &str, offset: usize) -> String {
        self.search_url
            .replace("{site}", &urlencoding::encode(site))
            .replace("{offset}", &offset.to_string())
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
