//! Command-line interface definitions for News Getter.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Tunables can be provided via command-line flags, environment variables, or
//! a YAML settings file; flags win over the file.

use crate::settings::Settings;
use clap::Parser;

/// Command-line arguments for the News Getter job runner.
///
/// # Examples
///
/// ```sh
/// # Request body inline
/// news_getter --body '{"site":"apnews.com","key":"k1","numtoget":15,"apiendpoint":"amqp://localhost:5672"}'
///
/// # Request body from a file, settings from YAML
/// news_getter --body-file job.json --config settings.yaml
///
/// # Request body on stdin
/// echo '{...}' | news_getter
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Job request body (JSON). Read from stdin when neither this nor --body-file is given.
    #[arg(short, long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Path to a file holding the job request body
    #[arg(short = 'f', long, env = "NEWS_GETTER_BODY_FILE")]
    pub body_file: Option<String>,

    /// Optional path to a settings.yaml file
    #[arg(short, long, env = "NEWS_GETTER_CONFIG")]
    pub config: Option<String>,

    /// Results per search page (also the offset step)
    #[arg(long, env = "NEWS_GETTER_PAGE_SIZE")]
    pub page_size: Option<usize>,

    /// Seconds to wait on one batch of article fetches
    #[arg(long, env = "NEWS_GETTER_BATCH_DEADLINE_SECS")]
    pub batch_deadline_secs: Option<u64>,

    /// Seconds allowed for a single publish
    #[arg(long, env = "NEWS_GETTER_PUBLISH_TIMEOUT_SECS")]
    pub publish_timeout_secs: Option<u64>,

    /// Exchange records are published to
    #[arg(long, env = "NEWS_GETTER_EXCHANGE")]
    pub exchange: Option<String>,

    /// Routing key records are published with
    #[arg(long, env = "NEWS_GETTER_ROUTING_KEY")]
    pub routing_key: Option<String>,

    /// Leave article tasks running past the batch deadline instead of cancelling them
    #[arg(long, env = "NEWS_GETTER_DETACH_ABANDONED")]
    pub detach_abandoned: bool,
}

impl Cli {
    /// Layer flag values over `settings`.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(page_size) = self.page_size {
            settings.page_size = page_size;
        }
        if let Some(secs) = self.batch_deadline_secs {
            settings.batch_deadline_secs = secs;
        }
        if let Some(secs) = self.publish_timeout_secs {
            settings.publish_timeout_secs = secs;
        }
        if let Some(exchange) = &self.exchange {
            settings.exchange = exchange.clone();
        }
        if let Some(routing_key) = &self.routing_key {
            settings.routing_key = routing_key.clone();
        }
        if self.detach_abandoned {
            settings.detach_abandoned = true;
        }
        settings
    }
}
