//! Error types for each layer of a job.
//!
//! Only [`JobError`] and page-level [`FetchError`]s end a job. [`UnitError`]
//! covers everything that can go wrong for a single article and is always
//! logged and dropped by the fan-out executor.

use std::time::Duration;
use thiserror::Error;

/// Failure to fetch a document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid header {name}: {reason}")]
    Header { name: String, reason: String },
}

/// Failure to hand a record to the broker.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Failure of one candidate's fetch, extract, and publish unit.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("article fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("article returned status {0}")]
    Status(u16),

    #[error("article has no <title>")]
    MissingTitle,

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Failure that prevents a job from running at all.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("malformed request body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("failed to build http client: {0}")]
    Client(#[from] FetchError),

    #[error("failed to connect to broker: {0}")]
    BrokerConnect(#[source] PublishError),
}

/// Failure to load the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
