//! Deterministic stand-ins for the network and collaborators.
//!
//! These record every call instead of touching DNS, HTTP or a real
//! notification channel, so tests can assert on what the engine did.

use crate::directory::AdminNotifier;
use crate::error::{Error, Result};
use crate::strategy::{FetchError, FetchedPage, LookupError, PageFetcher, TxtResolver};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// A resolver answering from a fixed table.
///
/// Unknown names have no records.
#[derive(Debug, Default)]
pub struct NullResolver {
    answers: Mutex<HashMap<String, std::result::Result<Vec<String>, LookupError>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl NullResolver {
    /// Create a resolver with no records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `records` for `name`.
    pub fn add_records(&self, name: &str, records: &[&str]) {
        self.answers.lock().insert(
            name.to_string(),
            Ok(records.iter().map(|r| (*r).to_string()).collect()),
        );
    }

    /// Fail lookups of `name` with `message`.
    pub fn fail(&self, name: &str, message: &str) {
        self.answers
            .lock()
            .insert(name.to_string(), Err(LookupError(message.to_string())));
    }

    /// Names looked up so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TxtResolver for NullResolver {
    async fn txt_records(&self, name: &str) -> std::result::Result<Vec<String>, LookupError> {
        self.calls.lock().push(name.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .get(name)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A fetcher answering from a fixed table.
///
/// Unknown URLs fail as unreachable.
#[derive(Debug, Default)]
pub struct NullFetcher {
    responses: Mutex<HashMap<String, std::result::Result<FetchedPage, FetchError>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl NullFetcher {
    /// Create a fetcher with no pages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every response.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve `body` with `status` at `url`.
    pub fn serve(&self, url: &str, status: u16, body: &str) {
        self.respond(
            url,
            Ok(FetchedPage {
                status,
                body: body.to_string(),
            }),
        );
    }

    /// Fail fetches of `url` with a network error.
    pub fn fail(&self, url: &str, message: &str) {
        self.respond(url, Err(FetchError::Network(message.to_string())));
    }

    /// Set the raw response for `url`.
    pub fn respond(&self, url: &str, response: std::result::Result<FetchedPage, FetchError>) {
        self.responses.lock().insert(url.to_string(), response);
    }

    /// URLs fetched so far.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PageFetcher for NullFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        self.calls.lock().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network("connection refused".to_string())))
    }
}

/// A notifier that records developer ids, optionally failing or stalling
/// every call.
#[derive(Debug, Default)]
pub struct NullNotifier {
    notified: Mutex<Vec<String>>,
    failing: bool,
    delay: Option<Duration>,
}

impl NullNotifier {
    /// Create a notifier that accepts every notification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a notifier whose every call fails (after recording it).
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Sleep before every notification.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Developer ids notified so far.
    #[must_use]
    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().clone()
    }
}

#[async_trait]
impl AdminNotifier for NullNotifier {
    async fn notify_ready_for_review(&self, developer_id: &str) -> Result<()> {
        self.notified.lock().push(developer_id.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(Error::Collaborator("review queue unavailable".to_string()));
        }
        Ok(())
    }
}
