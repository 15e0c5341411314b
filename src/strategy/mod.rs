//! Evidence checks, one per automated verification type.
//!
//! Each check fetches external evidence and compares it to the proof's
//! token. Checks never return engine errors: every problem is a
//! [`CheckFailure`] whose message tells the developer what to fix.
//!
//! ```text
//! VerificationType ──► Strategies::check ──► timeout(
//!                         │                    DNS_TXT     → DnsTxtCheck  → TxtResolver
//!                         │                    META_TAG    → MetaTagCheck → PageFetcher
//!                         │                    FILE_UPLOAD → FileCheck    → PageFetcher
//!                         │                  )
//!                         └─ MANUAL_REVIEW → NotAutomated (never reached from verify)
//! ```

mod dns;
mod file;
mod http;
mod meta;

pub use dns::{DnsTxtCheck, HickoryTxtResolver, LookupError, TxtResolver};
pub use file::FileCheck;
pub use http::{FetchError, FetchedPage, PageFetcher, ReqwestFetcher};
pub use meta::MetaTagCheck;

use crate::config::VerifierConfig;
use crate::proof::VerificationType;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why an evidence check did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckFailure {
    /// Resolver error other than "no such name".
    #[error("dns lookup failed: {0}")]
    DnsLookup(String),

    /// The verification name has no TXT records.
    #[error("no TXT records found at {0}")]
    NoTxtRecords(String),

    /// TXT records exist but none carries the token.
    #[error("dns TXT record at {0} does not match the verification token (token mismatch)")]
    DnsTokenMismatch(String),

    /// Homepage could not be fetched.
    #[error("homepage fetch failed: {0}")]
    HomepageFetch(String),

    /// Homepage answered with a non-success status.
    #[error("homepage returned HTTP {0}")]
    HomepageStatus(u16),

    /// Homepage has no verification meta tag.
    #[error("verification meta tag not found on homepage")]
    MetaTagMissing,

    /// Meta tag present with a different token.
    #[error("verification meta tag content does not match (token mismatch)")]
    MetaTagMismatch,

    /// Verification file could not be fetched.
    #[error("verification file fetch failed: {0}")]
    FileFetch(String),

    /// Verification file answered with a non-success status.
    #[error("verification file returned HTTP {0}")]
    FileStatus(u16),

    /// File content differs from the token.
    #[error("verification file content does not match (token mismatch)")]
    FileMismatch,

    /// The response exceeded the configured body limit.
    #[error("response body too large (limit {0} bytes)")]
    BodyTooLarge(usize),

    /// The check did not finish within the timeout.
    #[error("verification check timed out after {0}ms")]
    TimedOut(u128),

    /// The type has no automated check.
    #[error("{0} has no automated check")]
    NotAutomated(VerificationType),
}

/// The automated checks, dispatched by verification type.
pub struct Strategies {
    dns: DnsTxtCheck,
    meta: MetaTagCheck,
    file: FileCheck,
    timeout: Duration,
}

impl Strategies {
    /// Build the checks on top of the given protocol adapters.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn TxtResolver>,
        fetcher: Arc<dyn PageFetcher>,
        config: &VerifierConfig,
    ) -> Self {
        Self {
            dns: DnsTxtCheck::new(resolver, config.dns_label.clone()),
            meta: MetaTagCheck::new(Arc::clone(&fetcher), config.meta_names.clone()),
            file: FileCheck::new(fetcher, config.file_path.clone()),
            timeout: config.timeout(),
        }
    }

    /// Run the check for `verification_type`, bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns the [`CheckFailure`] describing why the evidence was rejected.
    pub async fn check(
        &self,
        verification_type: VerificationType,
        domain: &str,
        token: &str,
    ) -> Result<(), CheckFailure> {
        debug!("Running {verification_type} check for {domain}");

        let check = async {
            match verification_type {
                VerificationType::DnsTxt => self.dns.check(domain, token).await,
                VerificationType::MetaTag => self.meta.check(domain, token).await,
                VerificationType::FileUpload => self.file.check(domain, token).await,
                VerificationType::ManualReview => Err(CheckFailure::NotAutomated(verification_type)),
            }
        };

        match tokio::time::timeout(self.timeout, check).await {
            Ok(result) => result,
            Err(_) => Err(CheckFailure::TimedOut(self.timeout.as_millis())),
        }
    }
}
