//! Pagination driver and bounded fan-out executor.
//!
//! The job walks the search results one page at a time. Each page's
//! candidates become a batch: one task per candidate that fetches the article,
//! reads its title, and publishes a record. The driver waits for the batch to
//! finish or for the batch deadline, whichever comes first, and only then asks
//! for the next page.
//!
//! ```text
//! offset 0  ──fetch page──▶ [c0 … c9] ──spawn──▶ tasks ──join or deadline──┐
//! offset 10 ◀──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures inside a task are logged and counted; they never reach the driver.
//! Only a failed results page ends the job early, as does the rejection status.

use crate::error::{PublishError, UnitError};
use crate::extract;
use crate::fetch::{PageFetcher, Profile};
use crate::models::{ArticleRecord, Candidate, JobParams, JobReport, JobStatus};
use crate::publish::RecordSink;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How a single article task ended.
#[derive(Debug)]
enum UnitOutcome {
    Published,
    Failed,
    Cancelled,
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub dispatched: usize,
    pub published: usize,
    pub failed: usize,
    pub abandoned: usize,
    /// True when the deadline fired before every task finished.
    pub timed_out: bool,
}

/// Shared state every article task needs.
struct UnitContext<F: ?Sized, S: ?Sized> {
    fetcher: Arc<F>,
    sink: Arc<S>,
    params: Arc<JobParams>,
    datetime: Arc<str>,
    publish_timeout: Duration,
}

impl<F: ?Sized, S: ?Sized> Clone for UnitContext<F, S> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            sink: Arc::clone(&self.sink),
            params: Arc::clone(&self.params),
            datetime: Arc::clone(&self.datetime),
            publish_timeout: self.publish_timeout,
        }
    }
}

/// Runs one batch of article tasks under a wall-clock deadline.
pub struct FanOut<F: ?Sized, S: ?Sized> {
    ctx: UnitContext<F, S>,
    deadline: Duration,
    detach_abandoned: bool,
}

impl<F, S> FanOut<F, S>
where
    F: PageFetcher + ?Sized + 'static,
    S: RecordSink + ?Sized + 'static,
{
    pub fn new(
        fetcher: Arc<F>,
        sink: Arc<S>,
        params: Arc<JobParams>,
        datetime: &str,
        settings: &Settings,
    ) -> Self {
        Self {
            ctx: UnitContext {
                fetcher,
                sink,
                params,
                datetime: Arc::from(datetime),
                publish_timeout: settings.publish_timeout(),
            },
            deadline: settings.batch_deadline(),
            detach_abandoned: settings.detach_abandoned,
        }
    }

    /// Spawn one task per candidate and wait for them or the deadline.
    ///
    /// Tasks still running at the deadline are abandoned and counted as such:
    /// cancelled by default, or left running in the background when
    /// `detach_abandoned` is set.
    #[instrument(level = "info", skip_all, fields(batch = candidates.len()))]
    pub async fn run_batch(&self, candidates: Vec<Candidate>) -> BatchReport {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let mut report = BatchReport {
            dispatched: candidates.len(),
            ..BatchReport::default()
        };

        for candidate in candidates {
            let ctx = self.ctx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let link = candidate.link.clone();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(%link, "Article task cancelled");
                        UnitOutcome::Cancelled
                    }
                    result = process_candidate(&ctx, candidate) => match result {
                        Ok(()) => UnitOutcome::Published,
                        Err(e) => {
                            warn!(%link, error = %e, "Skipping article");
                            UnitOutcome::Failed
                        }
                    },
                }
            });
        }

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(UnitOutcome::Published)) => report.published += 1,
                    Some(Ok(UnitOutcome::Failed)) => report.failed += 1,
                    Some(Ok(UnitOutcome::Cancelled)) => report.abandoned += 1,
                    Some(Err(e)) => {
                        error!(error = %e, "Article task panicked");
                        report.failed += 1;
                    }
                    None => break,
                },
                _ = &mut deadline, if !report.timed_out => {
                    report.timed_out = true;
                    if self.detach_abandoned {
                        warn!(abandoned = tasks.len(), "Batch deadline reached; leaving tasks running");
                        report.abandoned += tasks.len();
                        tasks.detach_all();
                        break;
                    }
                    // Cancelled tasks drop their in-flight request and report
                    // back on the next poll, so draining them is immediate.
                    warn!(abandoned = tasks.len(), "Batch deadline reached; cancelling tasks");
                    cancel.cancel();
                }
            }
        }

        info!(
            published = report.published,
            failed = report.failed,
            abandoned = report.abandoned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch settled"
        );
        report
    }
}

/// Fetch, extract, build, publish. Every error stays inside the unit.
async fn process_candidate<F, S>(
    ctx: &UnitContext<F, S>,
    candidate: Candidate,
) -> Result<(), UnitError>
where
    F: PageFetcher + ?Sized,
    S: RecordSink + ?Sized,
{
    debug!(link = %candidate.link, "Fetching article");
    let page = ctx.fetcher.fetch(&candidate.link, Profile::Article).await?;
    if !page.is_success() {
        return Err(UnitError::Status(page.status));
    }

    let title = extract::page_title_from_html(&page.body).ok_or(UnitError::MissingTitle)?;
    debug!(link = %candidate.link, %title, "Extracted title");

    let record = ArticleRecord::from_candidate(candidate, &ctx.params, &ctx.datetime, title);
    tokio::time::timeout(ctx.publish_timeout, ctx.sink.publish(&record))
        .await
        .map_err(|_| PublishError::Timeout(ctx.publish_timeout))??;

    info!(headline = %record.headline, link = %record.link, "Published article");
    Ok(())
}

/// Walks results pages and hands each one to a [`FanOut`].
pub struct Paginator<'a, F: ?Sized, S: ?Sized> {
    fetcher: Arc<F>,
    fan_out: FanOut<F, S>,
    params: &'a JobParams,
    settings: &'a Settings,
}

impl<'a, F, S> Paginator<'a, F, S>
where
    F: PageFetcher + ?Sized + 'static,
    S: RecordSink + ?Sized + 'static,
{
    pub fn new(
        fetcher: Arc<F>,
        sink: Arc<S>,
        params: &'a JobParams,
        datetime: &str,
        settings: &'a Settings,
    ) -> Self {
        let fan_out = FanOut::new(
            Arc::clone(&fetcher),
            sink,
            Arc::new(params.clone()),
            datetime,
            settings,
        );
        Self {
            fetcher,
            fan_out,
            params,
            settings,
        }
    }

    /// Page through results until the target count is reached or the
    /// upstream stops cooperating.
    #[instrument(level = "info", skip_all, fields(site = %self.params.site, target = self.params.target_count()))]
    pub async fn run(&self) -> (JobStatus, JobReport) {
        let target = self.params.target_count();
        let page_size = self.settings.page_size.max(1);
        let mut report = JobReport::default();
        let mut offset = 0usize;

        while report.candidates < target {
            let url = self.settings.search_url_for(&self.params.site, offset);
            info!(%url, offset, "Fetching results page");

            let page = match self.fetcher.fetch(&url, Profile::Search).await {
                Ok(page) => page,
                Err(e) => {
                    error!(offset, error = %e, "Results page fetch failed");
                    return (JobStatus::UpstreamFailure, report);
                }
            };
            info!(status = page.status, "Results page status");

            if page.status == self.settings.rejection_status {
                warn!(offset, status = page.status, "Search engine rejected request; stopping");
                return (JobStatus::RateLimited, report);
            }
            if !page.is_success() {
                error!(offset, status = page.status, "Results page refused");
                return (JobStatus::UpstreamFailure, report);
            }
            report.pages += 1;

            let remaining = target - report.candidates;
            let candidates = extract::candidates_from_html(&page.body, remaining);
            if candidates.is_empty() {
                info!(offset, "No more results");
                break;
            }
            info!(count = candidates.len(), "Extracted candidates");
            report.candidates += candidates.len();

            let batch = self.fan_out.run_batch(candidates).await;
            debug!(
                offset,
                dispatched = batch.dispatched,
                timed_out = batch.timed_out,
                "Batch finished; advancing"
            );
            report.published += batch.published;
            report.failed += batch.failed;
            report.abandoned += batch.abandoned;

            offset += page_size;
        }

        (JobStatus::Done, report)
    }
}
