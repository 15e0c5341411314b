//! Hosted verification file check.

use super::http::{FetchError, PageFetcher};
use super::CheckFailure;
use std::sync::Arc;
use tracing::debug;

/// Checks that `https://<domain><path>` contains exactly the token.
pub struct FileCheck {
    fetcher: Arc<dyn PageFetcher>,
    path: String,
}

impl FileCheck {
    /// Create a check fetching `path` (must start with `/`).
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, path: String) -> Self {
        Self { fetcher, path }
    }

    /// Pass iff the trimmed body equals `token`.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckFailure`] for fetch errors, non-2xx responses or a
    /// content mismatch.
    pub async fn check(&self, domain: &str, token: &str) -> Result<(), CheckFailure> {
        let url = format!("https://{domain}{}", self.path);
        let page = self.fetcher.fetch(&url).await.map_err(|e| match e {
            FetchError::TooLarge(limit) => CheckFailure::BodyTooLarge(limit),
            FetchError::Network(msg) => CheckFailure::FileFetch(msg),
        })?;

        if !page.is_success() {
            return Err(CheckFailure::FileStatus(page.status));
        }

        let content = page.body.trim_start_matches('\u{feff}').trim();
        if content == token {
            debug!("Verification file at {url} matches");
            Ok(())
        } else {
            debug!("Verification file at {url} has {} bytes, no match", content.len());
            Err(CheckFailure::FileMismatch)
        }
    }
}
