//! HTTP fetch client with browser-like header profiles.
//!
//! A job creates one [`HttpFetcher`] and shares it between the pagination
//! driver and every article task. The underlying [`reqwest::Client`] pools
//! connections and owns a single cookie [`Jar`], so cookies the search engine
//! sets on the first page are replayed on later pages of the same job. A new
//! job gets a new jar.
//!
//! The fetcher reports the raw status code and never retries; callers decide
//! what a status means.

use crate::error::FetchError;
use crate::settings::{HeaderProfile, HeaderProfiles, Settings};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HOST, HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

/// Which header profile to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// The search results page.
    Search,
    /// An arbitrary article host.
    Article,
}

/// Status and body of a completed GET.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can GET a document.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, profile: Profile) -> Result<FetchedPage, FetchError>;
}

/// Pre-built headers for one [`HeaderProfile`].
#[derive(Debug, Clone)]
struct PreparedProfile {
    headers: HeaderMap,
}

impl PreparedProfile {
    fn prepare(profile: &HeaderProfile) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &profile.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::Header {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| FetchError::Header {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            headers.insert(name, value);
        }
        if let Some(host) = &profile.host {
            let value = HeaderValue::from_str(host).map_err(|e| FetchError::Header {
                name: HOST.to_string(),
                reason: e.to_string(),
            })?;
            headers.insert(HOST, value);
        }
        Ok(Self { headers })
    }
}

/// reqwest-backed [`PageFetcher`] with a per-job cookie jar.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    jar: Arc<Jar>,
    consent_cookie: String,
    search: PreparedProfile,
    article: PreparedProfile,
}

impl HttpFetcher {
    /// Build a fetcher from the job's settings.
    ///
    /// # Errors
    ///
    /// Fails if a configured header is not a valid HTTP header or the client
    /// cannot be built (e.g. no TLS backend).
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let HeaderProfiles { search, article } = &settings.profiles;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            client,
            jar,
            consent_cookie: settings.consent_cookie.clone(),
            search: PreparedProfile::prepare(search)?,
            article: PreparedProfile::prepare(article)?,
        })
    }

    fn profile(&self, profile: Profile) -> &PreparedProfile {
        match profile {
            Profile::Search => &self.search,
            Profile::Article => &self.article,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str, profile: Profile) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        // The consent cookie goes into the shared jar so it rides alongside
        // whatever session cookies the host already set.
        self.jar.add_cookie_str(&self.consent_cookie, &parsed);

        let response = self
            .client
            .get(parsed)
            .headers(self.profile(profile).headers.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, bytes = body.len(), "Fetched document");

        Ok(FetchedPage { status, body })
    }
}
