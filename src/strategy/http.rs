//! HTTP fetching for the meta tag and hosted file checks.

use crate::config::VerifierConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::redirect::Policy;
use thiserror::Error;
use tracing::debug;

/// Maximum redirects followed while fetching evidence.
const MAX_REDIRECTS: usize = 5;

/// A fetched HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// HTTP status code.
    pub status: u16,
    /// Response body, lossily decoded as UTF-8.
    pub body: String,
}

impl FetchedPage {
    /// Returns true for 2xx responses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Why a fetch produced no page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, TLS, DNS or timeout failure.
    #[error("{0}")]
    Network(String),

    /// The body exceeded the configured limit.
    #[error("response body exceeds {0} bytes")]
    TooLarge(usize),
}

/// Fetches a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url`, following a bounded number of redirects.
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError>;
}

/// [`PageFetcher`] backed by `reqwest`.
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ReqwestFetcher {
    /// Build a client with the configured user agent and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: &VerifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .redirect(same_host_redirects())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl PageFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        debug!("Fetching {url}");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(describe(&e)))?;

        let status = response.status().as_u16();
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(FetchError::TooLarge(self.max_body_bytes));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Network(describe(&e)))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::TooLarge(self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {url}: HTTP {status}, {} bytes", body.len());
        Ok(FetchedPage {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Follow at most [`MAX_REDIRECTS`] redirects, all on the original host.
///
/// A redirect to another host is not followed; the 3xx response itself is
/// returned and fails the check as a non-2xx status.
fn same_host_redirects() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let same_host = attempt
            .previous()
            .first()
            .is_some_and(|origin| origin.host_str() == attempt.url().host_str());
        if same_host {
            attempt.follow()
        } else {
            debug!("Not following redirect to {}", attempt.url());
            attempt.stop()
        }
    })
}

/// Flatten a reqwest error and its sources into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "could not connect".to_string()
    } else {
        err.to_string()
    };
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
