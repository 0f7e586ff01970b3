//! Mock fetcher and sink for tests.
//!
//! Both record every call so tests can assert on how many requests were made
//! and what was published.

use crate::error::{FetchError, PublishError};
use crate::fetch::{FetchedPage, PageFetcher, Profile};
use crate::models::ArticleRecord;
use crate::publish::RecordSink;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Page {
        status: u16,
        body: String,
        delay: Option<Duration>,
    },
    Fail,
}

/// Serves canned pages by exact URL. Unknown URLs fail like a transport error.
#[derive(Debug, Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Profile)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.insert(url, Reply::Page {
            status,
            body: body.to_string(),
            delay: None,
        });
    }

    pub fn respond_after(&self, url: &str, delay: Duration, status: u16, body: &str) {
        self.insert(url, Reply::Page {
            status,
            body: body.to_string(),
            delay: Some(delay),
        });
    }

    pub fn fail(&self, url: &str) {
        self.insert(url, Reply::Fail);
    }

    fn insert(&self, url: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(url.to_string(), reply);
    }

    /// Every requested URL, in request order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    pub fn calls_matching(&self, needle: &str) -> Vec<String> {
        self.calls().into_iter().filter(|u| u.contains(needle)).collect()
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.calls.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, profile: Profile) -> Result<FetchedPage, FetchError> {
        self.calls.lock().unwrap().push((url.to_string(), profile));
        let reply = self.replies.lock().unwrap().get(url).cloned();

        match reply {
            Some(Reply::Page { status, body, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(FetchedPage { status, body })
            }
            // A relative URL is the cheapest way to get a real error value.
            Some(Reply::Fail) | None => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                source: url::Url::parse("unreachable").unwrap_err(),
            }),
        }
    }
}

/// Collects published records; can fail or stall on demand.
#[derive(Debug, Default)]
pub struct MockSink {
    records: Mutex<Vec<ArticleRecord>>,
    failing_links: Mutex<HashSet<String>>,
    attempts: AtomicUsize,
    closed: AtomicBool,
    delay: Option<Duration>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_on(&self, link: &str) {
        self.failing_links.lock().unwrap().insert(link.to_string());
    }

    pub fn records(&self) -> Vec<ArticleRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Number of publish calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for MockSink {
    async fn publish(&self, record: &ArticleRecord) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_links.lock().unwrap().contains(&record.link) {
            return Err(PublishError::Unavailable("mock refused".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
