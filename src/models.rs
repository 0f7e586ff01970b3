//! Data models for job parameters, search candidates, and published records.
//!
//! This module defines the data that flows through one job:
//! - [`JobParams`]: The request a caller submits
//! - [`Candidate`]: A link and headline pulled from one search result
//! - [`ArticleRecord`]: The enriched record published to the message queue
//! - [`JobStatus`], [`JobReport`], [`JobResponse`]: What the caller gets back
//!
//! Wire field names (`numtoget`, `apiendpoint`, `pagetitle`, ...) are kept as
//! downstream consumers already read them, hence the `serde(rename)` attributes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters for a single job.
///
/// Every field is optional at the serde layer so that a missing field and an
/// empty one are rejected the same way by [`JobParams::validate`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobParams {
    /// The site to restrict the news search to (e.g. `apnews.com`).
    #[serde(default)]
    pub site: String,
    /// Correlation key copied onto every published record.
    #[serde(default)]
    pub key: String,
    /// How many articles to process before stopping.
    #[serde(default, rename = "numtoget")]
    pub num_to_get: i64,
    /// AMQP URI of the broker that receives the records.
    #[serde(default, rename = "apiendpoint")]
    pub api_endpoint: String,
}

impl JobParams {
    /// Check that every required field is present and usable.
    ///
    /// # Returns
    ///
    /// The names of the offending fields, or `Ok(())` when the job may run.
    pub fn validate(&self) -> Result<(), Vec<&'static str>> {
        let mut missing = Vec::new();
        if self.site.trim().is_empty() {
            missing.push("site");
        }
        if self.key.trim().is_empty() {
            missing.push("key");
        }
        if self.num_to_get <= 0 {
            missing.push("numtoget");
        }
        if self.api_endpoint.trim().is_empty() {
            missing.push("apiendpoint");
        }
        if missing.is_empty() { Ok(()) } else { Err(missing) }
    }

    /// The validated target count. Only meaningful after [`validate`](Self::validate).
    pub fn target_count(&self) -> usize {
        usize::try_from(self.num_to_get).unwrap_or(0)
    }
}

/// A link and headline taken from one search result entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub link: String,
    pub headline: String,
}

/// A fully enriched article, the unit published to the queue.
///
/// # JSON Schema
///
/// ```json
/// {"key": "...", "source": "...", "datetime": "2025-05-06 14:30:00",
///  "headline": "...", "pagetitle": "...", "link": "..."}
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ArticleRecord {
    /// Correlation key from the job parameters.
    pub key: String,
    /// The searched site.
    pub source: String,
    /// Job start time, shared by all records of a job.
    pub datetime: String,
    /// Headline as shown on the search results page.
    pub headline: String,
    /// `<title>` of the fetched article page.
    #[serde(rename = "pagetitle")]
    pub page_title: String,
    /// Normalized article URL.
    pub link: String,
}

impl ArticleRecord {
    /// Merge a candidate with job metadata and the fetched page title.
    pub fn from_candidate(
        candidate: Candidate,
        params: &JobParams,
        datetime: &str,
        page_title: String,
    ) -> Self {
        Self {
            key: params.key.clone(),
            source: params.site.clone(),
            datetime: datetime.to_string(),
            headline: candidate.headline,
            page_title,
            link: candidate.link,
        }
    }

    /// Serialize to the JSON payload sent to the broker.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Work was attempted; not every article was necessarily published.
    Done,
    /// The request was malformed or incomplete.
    BadRequest,
    /// The search engine rejected further requests.
    RateLimited,
    /// A results page could not be fetched or was refused.
    UpstreamFailure,
    /// The job could not start (e.g. the broker was unreachable).
    InternalFailure,
}

impl JobStatus {
    /// HTTP-style status code reported alongside the status.
    pub fn code(self) -> u16 {
        match self {
            JobStatus::Done => 200,
            JobStatus::BadRequest => 400,
            JobStatus::RateLimited => 429,
            JobStatus::UpstreamFailure => 502,
            JobStatus::InternalFailure => 500,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Done => "done",
            JobStatus::BadRequest => "bad_request",
            JobStatus::RateLimited => "rate_limited",
            JobStatus::UpstreamFailure => "upstream_failure",
            JobStatus::InternalFailure => "internal_failure",
        };
        f.write_str(s)
    }
}

/// Counters accumulated across every batch of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub pages: usize,
    pub candidates: usize,
    pub published: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// What a job hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub status: JobStatus,
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<JobReport>,
}

impl JobResponse {
    pub fn new(status: JobStatus, message: impl Into<String>, report: Option<JobReport>) -> Self {
        Self {
            status,
            code: status.code(),
            message: message.into(),
            report,
        }
    }
}
