//! DNS TXT record check.

use super::CheckFailure;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Resolver failure other than "no records".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Looks up TXT records.
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// TXT records at `name`, one string per record with its character
    /// strings concatenated. A name with no records yields an empty list.
    async fn txt_records(&self, name: &str) -> Result<Vec<String>, LookupError>;
}

/// [`TxtResolver`] backed by `hickory-resolver`.
pub struct HickoryTxtResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryTxtResolver {
    /// Use the system resolver configuration, falling back to public
    /// resolvers if it cannot be read.
    #[must_use]
    pub fn from_system_conf(timeout: Duration) -> Self {
        let (config, opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                warn!("Failed to read system resolver config, using defaults: {e}");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self::with_config(config, opts, timeout)
    }

    /// Use an explicit resolver configuration.
    #[must_use]
    pub fn with_config(config: ResolverConfig, mut opts: ResolverOpts, timeout: Duration) -> Self {
        opts.timeout = timeout;
        opts.attempts = 1;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn txt_records(&self, name: &str) -> Result<Vec<String>, LookupError> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.txt_data()
                        .iter()
                        .map(|part| String::from_utf8_lossy(part))
                        .collect::<String>()
                })
                .collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { response_code, .. } => {
                    empty_answer(name, *response_code)
                }
                _ => Err(LookupError(e.to_string())),
            },
        }
    }
}

/// An answer without records: empty for NOERROR, a lookup failure otherwise.
fn empty_answer(name: &str, response_code: ResponseCode) -> Result<Vec<String>, LookupError> {
    if response_code == ResponseCode::NoError {
        Ok(Vec::new())
    } else {
        Err(LookupError(format!("{name}: {response_code}")))
    }
}

/// Checks for the token in a TXT record at `<label>.<domain>`.
pub struct DnsTxtCheck {
    resolver: Arc<dyn TxtResolver>,
    label: String,
}

impl DnsTxtCheck {
    /// Create a check querying `<label>.<domain>`.
    #[must_use]
    pub fn new(resolver: Arc<dyn TxtResolver>, label: String) -> Self {
        Self { resolver, label }
    }

    /// Fully qualified record name for `domain`.
    #[must_use]
    pub fn record_name(&self, domain: &str) -> String {
        format!("{}.{domain}.", self.label)
    }

    /// Pass iff some TXT record, trimmed, equals `token` exactly.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckFailure`] for lookup errors, missing records or a
    /// token mismatch.
    pub async fn check(&self, domain: &str, token: &str) -> Result<(), CheckFailure> {
        let name = self.record_name(domain);
        let display_name = name.trim_end_matches('.');

        let records = self
            .resolver
            .txt_records(&name)
            .await
            .map_err(|e| CheckFailure::DnsLookup(e.0))?;

        if records.is_empty() {
            debug!("No TXT records at {display_name}");
            return Err(CheckFailure::NoTxtRecords(display_name.to_string()));
        }

        if records.iter().any(|record| record.trim() == token) {
            debug!("TXT token found at {display_name}");
            Ok(())
        } else {
            debug!(
                "{} TXT record(s) at {display_name}, none matching",
                records.len()
            );
            Err(CheckFailure::DnsTokenMismatch(display_name.to_string()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::nullables::NullResolver;

    const TOKEN: &str = "rapid-verify-abc123";
    const NAME: &str = "_rapid-verify.example.com.";

    fn check(resolver: &Arc<NullResolver>) -> DnsTxtCheck {
        DnsTxtCheck::new(
            Arc::clone(resolver) as Arc<dyn TxtResolver>,
            "_rapid-verify".into(),
        )
    }

    #[tokio::test]
    async fn test_matching_record_passes() {
        let resolver = Arc::new(NullResolver::new());
        resolver.add_records(NAME, &["v=spf1 -all", TOKEN]);
        assert_eq!(check(&resolver).check("example.com", TOKEN).await, Ok(()));
        assert_eq!(resolver.calls(), vec![NAME.to_string()]);
    }

    #[tokio::test]
    async fn test_superstring_does_not_pass() {
        let resolver = Arc::new(NullResolver::new());
        resolver.add_records(NAME, &[format!("prefix {TOKEN} suffix").as_str()]);
        assert_eq!(
            check(&resolver).check("example.com", TOKEN).await,
            Err(CheckFailure::DnsTokenMismatch(
                "_rapid-verify.example.com".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_missing_records() {
        let resolver = Arc::new(NullResolver::new());
        let result = check(&resolver).check("example.com", TOKEN).await;
        assert_eq!(
            result,
            Err(CheckFailure::NoTxtRecords("_rapid-verify.example.com".into()))
        );
    }

    #[tokio::test]
    async fn test_lookup_error() {
        let resolver = Arc::new(NullResolver::new());
        resolver.fail(NAME, "SERVFAIL");
        let result = check(&resolver).check("example.com", TOKEN).await;
        assert_eq!(result, Err(CheckFailure::DnsLookup("SERVFAIL".into())));
        assert!(result
            .unwrap_err()
            .to_string()
            .starts_with("dns lookup failed"));
    }

    #[test]
    fn test_nxdomain_is_a_lookup_failure() {
        assert_eq!(empty_answer(NAME, ResponseCode::NoError), Ok(Vec::new()));

        let err = empty_answer(NAME, ResponseCode::NXDomain).unwrap_err();
        assert!(err.0.starts_with(NAME));
        assert!(empty_answer(NAME, ResponseCode::ServFail).is_err());
    }

    #[tokio::test]
    async fn test_nxdomain_reported_as_lookup_failure() {
        let resolver = Arc::new(NullResolver::new());
        resolver.fail(NAME, "Non-Existent Domain");
        let result = check(&resolver).check("example.com", TOKEN).await;
        assert!(matches!(result, Err(CheckFailure::DnsLookup(_))));
        assert!(result
            .unwrap_err()
            .to_string()
            .starts_with("dns lookup failed"));
    }
}
