//! # News Getter
//!
//! A single-invocation job runner that pages through news search results for
//! one site, fetches every hit to read its page title, and publishes one JSON
//! record per article to an AMQP exchange.
//!
//! ## Usage
//!
//! ```sh
//! news_getter --body '{"site":"apnews.com","key":"k1","numtoget":15,"apiendpoint":"amqp://localhost:5672"}'
//! ```
//!
//! The job response is printed to stdout as JSON. Exit status is 0 when work
//! was attempted (including an early stop on rate limiting), 2 for a rejected
//! request, and 1 for any other failure.
//!
//! ## Architecture
//!
//! 1. **Validation**: Parse the request; reject it before any network activity
//! 2. **Pagination**: Fetch results pages at offsets 0, 10, 20, ...
//! 3. **Fan-out**: One task per result; fetch, extract title, publish
//! 4. **Deadline**: Wait on each batch for at most 20 seconds, then move on

use clap::Parser;
use std::error::Error;
use std::io::Read;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod error;
mod extract;
mod fetch;
mod job;
mod models;
mod pipeline;
mod publish;
mod settings;
#[cfg(test)]
mod testing;
mod utils;

use cli::Cli;
use job::{LiveBackends, handle_request};
use models::JobStatus;
use settings::Settings;
use utils::truncate_for_log;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    // Logs go to stderr so stdout carries only the job response.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_getter starting up");

    let args = Cli::parse();
    debug!(?args.body_file, ?args.config, "Parsed CLI arguments");

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let settings = args.apply(settings);
    debug!(?settings, "Effective settings");

    let body = read_body(&args)?;
    info!(body = %truncate_for_log(&body, 300), "Received request body");

    let response = handle_request(&body, &settings, &LiveBackends).await;
    println!("{}", serde_json::to_string(&response)?);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        status = %response.status,
        "Execution complete"
    );

    match response.status {
        JobStatus::Done | JobStatus::RateLimited => Ok(()),
        JobStatus::BadRequest => std::process::exit(2),
        JobStatus::UpstreamFailure | JobStatus::InternalFailure => std::process::exit(1),
    }
}

/// The request body from `--body`, `--body-file`, or stdin, in that order.
fn read_body(args: &Cli) -> Result<String, std::io::Error> {
    if let Some(body) = &args.body {
        return Ok(body.clone());
    }
    if let Some(path) = &args.body_file {
        return std::fs::read_to_string(path);
    }
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;
    Ok(body)
}
