//! Job orchestration: request parsing, validation, resource setup, teardown.
//!
//! [`handle_request`] is the single entry point. It never panics and never
//! exits the process; every outcome, including a broker that cannot be
//! reached, comes back as a [`JobResponse`] for the caller to act on.
//!
//! Fetch clients and sinks are built through [`Backends`] so that validation
//! provably happens before either exists.

use crate::error::{FetchError, JobError, PublishError};
use crate::fetch::{HttpFetcher, PageFetcher};
use crate::models::{JobParams, JobResponse, JobStatus};
use crate::pipeline::Paginator;
use crate::publish::{AmqpSink, RecordSink};
use crate::settings::Settings;
use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

/// Format of the `datetime` field on every record.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Builds the per-job fetch client and record sink.
#[async_trait]
pub trait Backends: Send + Sync {
    type Fetcher: PageFetcher + 'static;
    type Sink: RecordSink + 'static;

    fn fetcher(&self, settings: &Settings) -> Result<Self::Fetcher, FetchError>;

    async fn connect_sink(
        &self,
        params: &JobParams,
        settings: &Settings,
    ) -> Result<Self::Sink, PublishError>;
}

/// Real HTTP and AMQP.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiveBackends;

#[async_trait]
impl Backends for LiveBackends {
    type Fetcher = HttpFetcher;
    type Sink = AmqpSink;

    fn fetcher(&self, settings: &Settings) -> Result<HttpFetcher, FetchError> {
        HttpFetcher::new(settings)
    }

    async fn connect_sink(
        &self,
        params: &JobParams,
        settings: &Settings,
    ) -> Result<AmqpSink, PublishError> {
        AmqpSink::connect(&params.api_endpoint, &settings.exchange, &settings.routing_key).await
    }
}

/// Either the parameters themselves or a gateway envelope carrying them as a
/// JSON string in `body`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { body: String },
    Bare(JobParams),
}

/// Parse and validate a request body.
pub fn parse_request(raw: &str) -> Result<JobParams, JobError> {
    let params = match serde_json::from_str::<Envelope>(raw) {
        Ok(Envelope::Wrapped { body }) => serde_json::from_str::<JobParams>(&body)?,
        Ok(Envelope::Bare(params)) => params,
        // Re-parse for a precise error message.
        Err(_) => serde_json::from_str::<JobParams>(raw)?,
    };
    params.validate().map_err(JobError::MissingFields)?;
    Ok(params)
}

/// Run one job from its raw request body.
#[instrument(level = "info", skip_all)]
pub async fn handle_request<B: Backends>(raw: &str, settings: &Settings, backends: &B) -> JobResponse {
    let started = Instant::now();

    let params = match parse_request(raw) {
        Ok(params) => params,
        Err(e) => {
            warn!(error = %e, "Rejecting request");
            return JobResponse::new(JobStatus::BadRequest, e.to_string(), None);
        }
    };
    info!(site = %params.site, key = %params.key, target = params.num_to_get, "Accepted job");

    let response = match run_job(&params, settings, backends).await {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Job could not start");
            JobResponse::new(JobStatus::InternalFailure, e.to_string(), None)
        }
    };

    info!(
        status = %response.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Job finished"
    );
    response
}

/// Build resources for validated parameters, drive pagination, tear down.
async fn run_job<B: Backends>(
    params: &JobParams,
    settings: &Settings,
    backends: &B,
) -> Result<JobResponse, JobError> {
    let fetcher = Arc::new(backends.fetcher(settings)?);
    let sink = Arc::new(
        backends
            .connect_sink(params, settings)
            .await
            .map_err(JobError::BrokerConnect)?,
    );

    let datetime = Local::now().format(DATETIME_FORMAT).to_string();
    let (status, report) = Paginator::new(fetcher, Arc::clone(&sink), params, &datetime, settings)
        .run()
        .await;

    sink.close().await;

    let message = match status {
        JobStatus::Done => format!(
            "Done: published {} of {} articles",
            report.published, report.candidates
        ),
        JobStatus::RateLimited => format!(
            "Rate limited after {} pages; published {} articles",
            report.pages, report.published
        ),
        JobStatus::UpstreamFailure => format!(
            "Results page fetch failed after {} pages",
            report.pages
        ),
        other => other.to_string(),
    };
    Ok(JobResponse::new(status, message, Some(report)))
}
