//! Verification orchestrator.
//!
//! Drives a proof through its state machine:
//!
//! ```text
//! verify(id)
//!    │
//!    ▼
//! ┌───────────────┐   VERIFIED ──► success (no mutation)
//! │ load + gate   │── EXPIRED / past expires_at ──► EXPIRED
//! └──────┬────────┘── FAILED / retries exhausted ──► FAILED
//!        │        ─── MANUAL_REVIEW ──► pending (no mutation, no retry)
//!        ▼
//! ┌───────────────┐
//! │ strategy check│ (bounded by timeout)
//! └──────┬────────┘
//!   pass │ fail
//!        ▼
//! VERIFIED + notify   retry_count += 1, FAILED at max_retries
//! ```
//!
//! The orchestrator keeps no state between calls beyond per-proof locks;
//! everything lives in the [`ProofStore`].

mod locks;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::directory::{
    AdminNotifier, AppDirectory, DeveloperDirectory, InMemoryDirectory, TracingNotifier,
};
use crate::error::{Error, Result};
use crate::event::{
    create_event_channel, VerificationEvent, VerificationEventsChannel, VerificationEventsSender,
};
use crate::proof::{
    normalize_domain, render_instructions, ProofId, ProofPatch, ProofView, TokenGenerator,
    VerificationProof, VerificationStatus, VerificationType,
};
use crate::store::{MemoryProofStore, ProofStore};
use crate::strategy::{
    CheckFailure, HickoryTxtResolver, PageFetcher, ReqwestFetcher, Strategies, TxtResolver,
};
use chrono::{DateTime, Utc};
use locks::ProofLocks;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reported when a proof is checked after its token expired.
pub const EXPIRED_MESSAGE: &str = "verification token expired";

/// Reported once a proof has no retries left.
pub const RETRIES_EXCEEDED_MESSAGE: &str = "maximum retry attempts exceeded";

/// Reported for manual review proofs.
pub const MANUAL_REVIEW_MESSAGE: &str = "pending manual review";

/// Store updates retried after revision conflicts before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Request to start verifying a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateRequest {
    /// Claiming developer.
    pub developer_id: String,
    /// Claimed domain.
    pub domain: String,
    /// One of `DNS_TXT`, `META_TAG`, `FILE_UPLOAD`, `MANUAL_REVIEW`.
    pub verification_type: String,
    /// App the claim is for.
    pub app_id: Option<String>,
}

/// Result of a successful [`Orchestrator::initiate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Initiated {
    /// New proof id.
    pub verification_id: ProofId,
    /// Token the developer must publish.
    pub token: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Setup instructions.
    pub instructions: String,
}

/// Result of [`Orchestrator::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    /// True iff the proof is verified.
    pub verified: bool,
    /// Proof status after this call.
    pub status: VerificationStatus,
    /// Human-readable result.
    pub message: String,
}

impl VerifyOutcome {
    fn success(message: &str) -> Self {
        Self {
            verified: true,
            status: VerificationStatus::Verified,
            message: message.to_string(),
        }
    }

    fn failure(status: VerificationStatus, message: impl Into<String>) -> Self {
        Self {
            verified: false,
            status,
            message: message.into(),
        }
    }
}

/// What `verify` must do with a proof, decided before any network I/O.
///
/// Only [`Gate::Check`] consumes a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    AlreadyVerified,
    AlreadyExpired,
    AlreadyFailed,
    Expire,
    ExhaustRetries,
    AwaitManualReview,
    Check,
}

fn gate(proof: &VerificationProof, now: DateTime<Utc>) -> Gate {
    match proof.status {
        VerificationStatus::Verified => Gate::AlreadyVerified,
        VerificationStatus::Expired => Gate::AlreadyExpired,
        VerificationStatus::Failed => Gate::AlreadyFailed,
        VerificationStatus::Pending if proof.is_expired_at(now) => Gate::Expire,
        VerificationStatus::Pending if proof.retries_exhausted() => Gate::ExhaustRetries,
        VerificationStatus::Pending if !proof.verification_type.is_automated() => {
            Gate::AwaitManualReview
        }
        VerificationStatus::Pending => Gate::Check,
    }
}

/// Builder for constructing an [`Orchestrator`].
///
/// Anything not supplied falls back to the production default: an
/// in-memory store, a directory seeded from configuration, a logging
/// notifier, the system DNS resolver and a `reqwest` client.
pub struct OrchestratorBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn ProofStore>>,
    developers: Option<Arc<dyn DeveloperDirectory>>,
    apps: Option<Arc<dyn AppDirectory>>,
    notifier: Option<Arc<dyn AdminNotifier>>,
    resolver: Option<Arc<dyn TxtResolver>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    clock: Option<Arc<dyn Clock>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            store: None,
            developers: None,
            apps: None,
            notifier: None,
            resolver: None,
            fetcher: None,
            clock: None,
        }
    }

    /// Use `store` for proofs.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ProofStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `developers` for developer lookups and verification marks.
    #[must_use]
    pub fn developers(mut self, developers: Arc<dyn DeveloperDirectory>) -> Self {
        self.developers = Some(developers);
        self
    }

    /// Use `apps` for app ownership checks and verification marks.
    #[must_use]
    pub fn apps(mut self, apps: Arc<dyn AppDirectory>) -> Self {
        self.apps = Some(apps);
        self
    }

    /// Use `notifier` for admin review notifications.
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn AdminNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Use `resolver` for DNS TXT lookups.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn TxtResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use `fetcher` for HTTP fetches.
    #[must_use]
    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use `clock` as the time source.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryProofStore::with_clock(Arc::clone(&clock))));

        let (developers, apps) = match (self.developers, self.apps) {
            (Some(developers), Some(apps)) => (developers, apps),
            (developers, apps) => {
                let seeded = Arc::new(InMemoryDirectory::from_config(&self.config.directory));
                (
                    developers.unwrap_or_else(|| Arc::clone(&seeded) as Arc<dyn DeveloperDirectory>),
                    apps.unwrap_or_else(|| seeded as Arc<dyn AppDirectory>),
                )
            }
        };

        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));
        let resolver = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(HickoryTxtResolver::from_system_conf(
                self.config.verifier.timeout(),
            )),
        };
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(ReqwestFetcher::new(&self.config.verifier)?),
        };

        let strategies = Strategies::new(resolver, fetcher, &self.config.verifier);
        let tokens = TokenGenerator::new(self.config.policy.token_ttl());
        let (events_tx, _) = create_event_channel();

        info!(
            "Verification orchestrator initialized (max_retries={}, token_ttl_days={}, timeout_ms={})",
            self.config.policy.max_retries,
            self.config.policy.token_ttl_days,
            self.config.verifier.timeout_ms
        );

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                store,
                developers,
                apps,
                notifier,
                strategies,
                tokens,
                clock,
                locks: ProofLocks::default(),
                events_tx,
            }),
        })
    }
}

/// Domain ownership verification engine.
///
/// Construct once with [`OrchestratorBuilder`] and share by cloning; clones
/// refer to the same store, collaborators and event channel.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    store: Arc<dyn ProofStore>,
    developers: Arc<dyn DeveloperDirectory>,
    apps: Arc<dyn AppDirectory>,
    notifier: Arc<dyn AdminNotifier>,
    strategies: Strategies,
    tokens: TokenGenerator,
    clock: Arc<dyn Clock>,
    locks: ProofLocks,
    events_tx: VerificationEventsSender,
}

impl Orchestrator {
    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> VerificationEventsChannel {
        self.inner.events_tx.subscribe()
    }

    /// Start a verification: validate the claim, create a `PENDING` proof
    /// and return its token and setup instructions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeveloperNotFound`], [`Error::AppNotFound`],
    /// [`Error::InvalidDomain`] or [`Error::InvalidVerificationType`] for bad
    /// input (nothing is persisted), or a store/collaborator error.
    pub async fn initiate(&self, request: InitiateRequest) -> Result<Initiated> {
        let inner = &self.inner;

        let developer_known = inner
            .bounded("developer lookup", inner.developers.exists(&request.developer_id))
            .await?;
        if !developer_known {
            return Err(Error::DeveloperNotFound(request.developer_id));
        }
        if let Some(ref app_id) = request.app_id {
            let app_owned = inner
                .bounded("app lookup", inner.apps.exists(app_id, &request.developer_id))
                .await?;
            if !app_owned {
                return Err(Error::AppNotFound(app_id.clone()));
            }
        }
        let domain = normalize_domain(&request.domain)?;
        let verification_type: VerificationType = request.verification_type.parse()?;

        let now = inner.clock.now();
        let token = inner.tokens.generate();
        let proof = VerificationProof {
            id: ProofId::new(),
            developer_id: request.developer_id,
            app_id: request.app_id,
            domain,
            verification_type,
            verification_token: token.clone(),
            status: VerificationStatus::Pending,
            retry_count: 0,
            max_retries: inner.config.policy.max_retries,
            failure_reason: None,
            verification_data: None,
            created_at: now,
            expires_at: inner.tokens.expiry_for(now),
            verified_at: None,
            updated_at: now,
            revision: 0,
        };
        let instructions =
            render_instructions(verification_type, &token, &proof.domain, &inner.config.verifier);

        inner.store.create(proof.clone()).await?;

        info!(
            "Initiated {} verification {} for {} (developer {})",
            verification_type, proof.id, proof.domain, proof.developer_id
        );
        inner.emit(VerificationEvent::Initiated {
            id: proof.id,
            developer_id: proof.developer_id.clone(),
            domain: proof.domain.clone(),
            method: verification_type,
        });

        Ok(Initiated {
            verification_id: proof.id,
            token,
            expires_at: proof.expires_at,
            instructions,
        })
    }

    /// Check the evidence for a proof and record the result.
    ///
    /// Evidence failures are not errors: they come back as an outcome with
    /// `verified == false` and a specific message.
    ///
    /// The check runs on its own task, so dropping the returned future
    /// does not abandon an in-flight check: its result is still recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id, or a store error.
    pub async fn verify(&self, id: &ProofId) -> Result<VerifyOutcome> {
        let inner = Arc::clone(&self.inner);
        let id = *id;
        tokio::spawn(async move { inner.verify(id).await })
            .await
            .map_err(|e| Error::Internal(format!("verification task for {id} failed: {e}")))?
    }

    /// Read a proof owned by `developer_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the proof does not exist or belongs to
    /// someone else; the two cases are indistinguishable.
    pub async fn get_status(&self, id: &ProofId, developer_id: &str) -> Result<ProofView> {
        let proof = self.inner.store.load(id).await?;
        if !proof.is_owned_by(developer_id) {
            debug!("Developer {developer_id} denied access to verification {id}");
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(ProofView::from(&proof))
    }

    /// All proofs owned by `developer_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn list(&self, developer_id: &str) -> Result<Vec<ProofView>> {
        let proofs = self.inner.store.list_by_developer(developer_id).await?;
        Ok(proofs.iter().map(ProofView::from).collect())
    }

    /// Delete a proof owned by `developer_id`.
    ///
    /// Returns `false` if the proof does not exist or belongs to someone else.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn delete(&self, id: &ProofId, developer_id: &str) -> Result<bool> {
        let _lock = self.inner.locks.lock(*id).await;
        let deleted = self.inner.store.delete(id, developer_id).await?;
        if deleted {
            info!("Deleted verification {id} (developer {developer_id})");
            self.inner.emit(VerificationEvent::Deleted { id: *id });
        }
        Ok(deleted)
    }

    /// The most recently verified proof for `domain` owned by `developer_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDomain`] for a malformed domain, or a store error.
    pub async fn latest_verified(
        &self,
        developer_id: &str,
        domain: &str,
    ) -> Result<Option<ProofView>> {
        let domain = normalize_domain(domain)?;
        let proofs = self.inner.store.list_by_developer(developer_id).await?;
        Ok(proofs
            .iter()
            .filter(|p| p.status == VerificationStatus::Verified && p.domain == domain)
            .max_by_key(|p| p.verified_at)
            .map(ProofView::from))
    }
}

impl Inner {
    /// Bound a collaborator call by the verifier timeout.
    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.config.verifier.timeout();
        tokio::time::timeout(limit, call).await.map_err(|_| {
            Error::Collaborator(format!("{what} timed out after {}ms", limit.as_millis()))
        })?
    }

    fn emit(&self, event: VerificationEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    async fn verify(&self, id: ProofId) -> Result<VerifyOutcome> {
        let _lock = self.locks.lock(id).await;

        // At most one strategy run per call, reused if the update must be retried.
        let mut check: Option<std::result::Result<(), CheckFailure>> = None;

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let proof = self.store.load(&id).await?;
            let now = self.clock.now();

            let decision = gate(&proof, now);
            let (patch, outcome) = match decision {
                Gate::AlreadyVerified => {
                    debug!("Verification {id} already verified");
                    return Ok(VerifyOutcome::success("domain already verified"));
                }
                Gate::AlreadyExpired => {
                    return Ok(VerifyOutcome::failure(
                        VerificationStatus::Expired,
                        EXPIRED_MESSAGE,
                    ));
                }
                Gate::AlreadyFailed => {
                    return Ok(VerifyOutcome::failure(
                        VerificationStatus::Failed,
                        RETRIES_EXCEEDED_MESSAGE,
                    ));
                }
                Gate::AwaitManualReview => {
                    debug!("Verification {id} awaits manual review");
                    return Ok(VerifyOutcome::failure(
                        VerificationStatus::Pending,
                        MANUAL_REVIEW_MESSAGE,
                    ));
                }
                Gate::Expire => (
                    ProofPatch::expired(EXPIRED_MESSAGE),
                    VerifyOutcome::failure(VerificationStatus::Expired, EXPIRED_MESSAGE),
                ),
                Gate::ExhaustRetries => (
                    ProofPatch::retries_exhausted(RETRIES_EXCEEDED_MESSAGE),
                    VerifyOutcome::failure(VerificationStatus::Failed, RETRIES_EXCEEDED_MESSAGE),
                ),
                Gate::Check => {
                    let result = match check {
                        Some(ref result) => result.clone(),
                        None => {
                            let result = self
                                .strategies
                                .check(
                                    proof.verification_type,
                                    &proof.domain,
                                    &proof.verification_token,
                                )
                                .await;
                            check = Some(result.clone());
                            result
                        }
                    };
                    check_patch(&proof, result, now)
                }
            };

            match self.store.update(&id, proof.revision, &patch).await {
                Ok(updated) => {
                    self.after_transition(&updated, decision == Gate::Check).await;
                    return Ok(outcome);
                }
                Err(Error::Conflict(reason)) => {
                    debug!("Verification {id} changed concurrently ({reason}), reloading");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::Conflict(format!(
            "verification {id} kept changing during verify"
        )))
    }

    /// Emit events and notify collaborators for a freshly written proof.
    async fn after_transition(&self, proof: &VerificationProof, consumed_retry: bool) {
        if consumed_retry && proof.status != VerificationStatus::Verified {
            let reason = proof.failure_reason.clone().unwrap_or_default();
            info!(
                "Verification {} attempt {}/{} failed: {reason}",
                proof.id, proof.retry_count, proof.max_retries
            );
            self.emit(VerificationEvent::AttemptFailed {
                id: proof.id,
                retry_count: proof.retry_count,
                reason,
            });
        }

        match proof.status {
            VerificationStatus::Verified => {
                info!(
                    "Domain {} verified via {} (verification {}, developer {})",
                    proof.domain, proof.verification_type, proof.id, proof.developer_id
                );
                self.emit(VerificationEvent::Verified {
                    id: proof.id,
                    developer_id: proof.developer_id.clone(),
                    domain: proof.domain.clone(),
                    method: proof.verification_type,
                });
                self.notify_verified(proof).await;
            }
            VerificationStatus::Expired => {
                info!("Verification {} expired", proof.id);
                self.emit(VerificationEvent::Expired { id: proof.id });
            }
            VerificationStatus::Failed => {
                info!("Verification {} failed: retries exhausted", proof.id);
                self.emit(VerificationEvent::Failed { id: proof.id });
            }
            VerificationStatus::Pending => {}
        }
    }

    /// Tell collaborators about a verified proof. Failures are logged, never
    /// propagated: the proof stays verified.
    async fn notify_verified(&self, proof: &VerificationProof) {
        let mut failures = Vec::new();

        let developer_mark = self.developers.mark_domain_verified(
            &proof.developer_id,
            proof.verification_type,
        );
        if let Err(e) = self.bounded("developer update", developer_mark).await {
            failures.push(format!("mark developer verified: {e}"));
        }
        if let Some(ref app_id) = proof.app_id {
            let app_mark = self.apps.mark_domain_verified(app_id, &proof.domain);
            if let Err(e) = self.bounded("app update", app_mark).await {
                failures.push(format!("mark app {app_id} verified: {e}"));
            }
        }
        let notification = self.notifier.notify_ready_for_review(&proof.developer_id);
        if let Err(e) = self.bounded("admin notification", notification).await {
            failures.push(format!("admin notification: {e}"));
        }

        for message in failures {
            warn!("Post-verification step failed for {}: {message}", proof.id);
            self.emit(VerificationEvent::NotificationFailed {
                id: proof.id,
                message,
            });
        }
    }
}

/// Patch and outcome for a strategy result on a `PENDING` proof.
fn check_patch(
    proof: &VerificationProof,
    result: std::result::Result<(), CheckFailure>,
    now: DateTime<Utc>,
) -> (ProofPatch, VerifyOutcome) {
    match result {
        Ok(()) => (
            ProofPatch::verified(proof.verification_type, now),
            VerifyOutcome::success("domain verified"),
        ),
        Err(failure) => {
            let retry_count = proof.retry_count + 1;
            let reason = failure.to_string();
            let patch = ProofPatch::attempt_failed(retry_count, proof.max_retries, reason.clone());
            let status = patch.status.unwrap_or(VerificationStatus::Pending);
            let message = if status == VerificationStatus::Failed {
                format!("{reason}; {RETRIES_EXCEEDED_MESSAGE}")
            } else {
                format!(
                    "{reason} (attempt {retry_count} of {})",
                    proof.max_retries
                )
            };
            (patch, VerifyOutcome::failure(status, message))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::NullClock;
    use crate::nullables::{NullFetcher, NullNotifier, NullResolver};
    use crate::proof::tests::sample_proof;
    use chrono::Duration;

    const DEV: &str = "dev-1";
    const HOME: &str = "https://example.com/";
    const FILE: &str = "https://example.com/rapid-verify.txt";
    const TXT: &str = "_rapid-verify.example.com.";

    struct Harness {
        orchestrator: Orchestrator,
        resolver: Arc<NullResolver>,
        fetcher: Arc<NullFetcher>,
        notifier: Arc<NullNotifier>,
        directory: Arc<InMemoryDirectory>,
        clock: Arc<NullClock>,
    }

    fn harness_with(
        resolver: NullResolver,
        fetcher: NullFetcher,
        notifier: NullNotifier,
    ) -> Harness {
        let resolver = Arc::new(resolver);
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(notifier);
        let clock = Arc::new(NullClock::default());
        let directory = Arc::new(InMemoryDirectory::new());
        directory.add_app(DEV, "app-1");
        directory.add_developer("dev-2");

        let mut config = EngineConfig::default();
        config.verifier.timeout_ms = 200;

        let orchestrator = OrchestratorBuilder::new(config)
            .store(Arc::new(MemoryProofStore::with_clock(
                Arc::clone(&clock) as Arc<dyn Clock>
            )))
            .developers(Arc::clone(&directory) as Arc<dyn DeveloperDirectory>)
            .apps(Arc::clone(&directory) as Arc<dyn AppDirectory>)
            .notifier(Arc::clone(&notifier) as Arc<dyn AdminNotifier>)
            .resolver(Arc::clone(&resolver) as Arc<dyn TxtResolver>)
            .fetcher(Arc::clone(&fetcher) as Arc<dyn PageFetcher>)
            .clock(Arc::clone(&clock) as Arc<dyn Clock>)
            .build()
            .unwrap();

        Harness {
            orchestrator,
            resolver,
            fetcher,
            notifier,
            directory,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(NullResolver::new(), NullFetcher::new(), NullNotifier::new())
    }

    fn request(verification_type: &str) -> InitiateRequest {
        InitiateRequest {
            developer_id: DEV.to_string(),
            domain: "Example.com".to_string(),
            verification_type: verification_type.to_string(),
            app_id: Some("app-1".to_string()),
        }
    }

    fn meta_page(token: &str) -> String {
        format!(r#"<html><head><meta name="rapid-verify" content="{token}"></head></html>"#)
    }

    #[test]
    fn test_gate_order() {
        let now = Utc::now();
        let mut proof = sample_proof("dev-1", now);
        assert_eq!(gate(&proof, now), Gate::Check);

        proof.verification_type = VerificationType::ManualReview;
        assert_eq!(gate(&proof, now), Gate::AwaitManualReview);

        proof.retry_count = proof.max_retries;
        assert_eq!(gate(&proof, now), Gate::ExhaustRetries);

        // Expiry wins over exhausted retries.
        assert_eq!(gate(&proof, now + Duration::days(8)), Gate::Expire);

        proof.status = VerificationStatus::Verified;
        assert_eq!(gate(&proof, now + Duration::days(8)), Gate::AlreadyVerified);
        proof.status = VerificationStatus::Failed;
        assert_eq!(gate(&proof, now), Gate::AlreadyFailed);
        proof.status = VerificationStatus::Expired;
        assert_eq!(gate(&proof, now), Gate::AlreadyExpired);
    }

    #[test]
    fn test_check_patch_on_last_attempt() {
        let now = Utc::now();
        let mut proof = sample_proof("dev-1", now);
        proof.retry_count = 2;

        let (patch, outcome) = check_patch(&proof, Err(CheckFailure::MetaTagMismatch), now);
        assert_eq!(patch.retry_count, Some(3));
        assert_eq!(patch.status, Some(VerificationStatus::Failed));
        assert_eq!(outcome.status, VerificationStatus::Failed);
        assert!(outcome.message.contains("token mismatch"));
        assert!(outcome.message.contains(RETRIES_EXCEEDED_MESSAGE));
    }

    #[test]
    fn test_check_patch_success() {
        let now = Utc::now();
        let proof = sample_proof("dev-1", now);
        let (patch, outcome) = check_patch(&proof, Ok(()), now);
        assert_eq!(patch.status, Some(VerificationStatus::Verified));
        assert!(outcome.verified);
    }

    #[tokio::test]
    async fn test_initiate_creates_pending_proof() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();

        assert!(initiated.token.starts_with(crate::proof::TOKEN_PREFIX));
        assert!(initiated.instructions.contains(&initiated.token));
        assert_eq!(initiated.expires_at, h.clock.now() + Duration::days(7));

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.status, VerificationStatus::Pending);
        assert_eq!(view.domain, "example.com");
        assert_eq!(view.retry_count, 0);
        assert_eq!(view.max_retries, 3);
    }

    #[tokio::test]
    async fn test_initiate_rejects_bad_input_without_persisting() {
        let h = harness();

        let mut unknown_dev = request("DNS_TXT");
        unknown_dev.developer_id = "nobody".into();
        assert!(matches!(
            h.orchestrator.initiate(unknown_dev).await,
            Err(Error::DeveloperNotFound(_))
        ));

        let mut foreign_app = request("DNS_TXT");
        foreign_app.developer_id = "dev-2".into();
        assert!(matches!(
            h.orchestrator.initiate(foreign_app).await,
            Err(Error::AppNotFound(_))
        ));

        let mut bad_domain = request("DNS_TXT");
        bad_domain.domain = "not a domain".into();
        assert!(matches!(
            h.orchestrator.initiate(bad_domain).await,
            Err(Error::InvalidDomain { .. })
        ));

        assert!(matches!(
            h.orchestrator.initiate(request("SMS")).await,
            Err(Error::InvalidVerificationType(_))
        ));

        assert!(h.orchestrator.list(DEV).await.unwrap().is_empty());
        assert!(h.orchestrator.list("dev-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dns_success_notifies_collaborators() {
        let h = harness();
        let mut events = h.orchestrator.subscribe();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();
        h.resolver.add_records(TXT, &[initiated.token.as_str()]);

        let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert!(outcome.verified);
        assert_eq!(outcome.status, VerificationStatus::Verified);

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.verified_at, Some(h.clock.now()));
        assert_eq!(view.failure_reason, None);

        assert_eq!(
            h.directory.developer_verification(DEV),
            Some(VerificationType::DnsTxt)
        );
        assert_eq!(
            h.directory.app_verified_domain("app-1").as_deref(),
            Some("example.com")
        );
        assert_eq!(h.notifier.notified(), vec![DEV.to_string()]);

        assert!(matches!(events.recv().await, Ok(VerificationEvent::Initiated { .. })));
        assert!(matches!(events.recv().await, Ok(VerificationEvent::Verified { .. })));
    }

    #[tokio::test]
    async fn test_verified_is_idempotent() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();
        h.resolver.add_records(TXT, &[initiated.token.as_str()]);
        h.orchestrator.verify(&initiated.verification_id).await.unwrap();

        h.clock.advance(Duration::days(30));
        let again = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert!(again.verified);
        assert_eq!(again.message, "domain already verified");
        assert_eq!(h.resolver.calls().len(), 1);
        assert_eq!(h.notifier.notified().len(), 1);
    }

    #[tokio::test]
    async fn test_meta_mismatch_consumes_one_retry() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("META_TAG")).await.unwrap();
        h.fetcher.serve(HOME, 200, &meta_page("rapid-verify-wrong"));

        let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert!(!outcome.verified);
        assert_eq!(outcome.status, VerificationStatus::Pending);
        assert!(outcome.message.contains("token mismatch"));

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.retry_count, 1);
        assert!(view.failure_reason.unwrap().contains("token mismatch"));
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("FILE_UPLOAD")).await.unwrap();

        for attempt in 1..=3u32 {
            let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
            assert!(!outcome.verified);
            let view = h
                .orchestrator
                .get_status(&initiated.verification_id, DEV)
                .await
                .unwrap();
            assert_eq!(view.retry_count, attempt);
        }

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.status, VerificationStatus::Failed);

        // The file is fixed now, but no more checks run.
        h.fetcher.serve(FILE, 200, &initiated.token);
        let fourth = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert_eq!(fourth.status, VerificationStatus::Failed);
        assert_eq!(fourth.message, RETRIES_EXCEEDED_MESSAGE);
        assert_eq!(h.fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_expiry_wins_over_valid_evidence() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();
        h.resolver.add_records(TXT, &[initiated.token.as_str()]);
        h.clock.advance(Duration::days(7) + Duration::seconds(1));

        let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert_eq!(outcome.status, VerificationStatus::Expired);
        assert_eq!(outcome.message, EXPIRED_MESSAGE);
        assert!(h.resolver.calls().is_empty());

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.status, VerificationStatus::Expired);
        assert_eq!(view.retry_count, 0);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_inclusive() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();
        h.resolver.add_records(TXT, &[initiated.token.as_str()]);
        h.clock.set(initiated.expires_at);

        let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert!(outcome.verified);
    }

    #[tokio::test]
    async fn test_manual_review_never_consumes_retries() {
        let h = harness();
        let initiated = h
            .orchestrator
            .initiate(request("MANUAL_REVIEW"))
            .await
            .unwrap();

        for _ in 0..5 {
            let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
            assert_eq!(outcome.status, VerificationStatus::Pending);
            assert_eq!(outcome.message, MANUAL_REVIEW_MESSAGE);
        }

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.retry_count, 0);
        assert!(h.resolver.calls().is_empty());
        assert!(h.fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_developer_sees_not_found() {
        let h = harness();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();

        let foreign = h
            .orchestrator
            .get_status(&initiated.verification_id, "dev-2")
            .await
            .unwrap_err();
        let missing = h
            .orchestrator
            .get_status(&ProofId::new(), "dev-2")
            .await
            .unwrap_err();
        assert!(matches!(foreign, Error::NotFound(_)));
        assert!(matches!(missing, Error::NotFound(_)));

        assert!(!h
            .orchestrator
            .delete(&initiated.verification_id, "dev-2")
            .await
            .unwrap());
        assert!(h
            .orchestrator
            .delete(&initiated.verification_id, DEV)
            .await
            .unwrap());
        assert!(matches!(
            h.orchestrator.verify(&initiated.verification_id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_proof_verified() {
        let h = harness_with(NullResolver::new(), NullFetcher::new(), NullNotifier::failing());
        let mut events = h.orchestrator.subscribe();
        let initiated = h.orchestrator.initiate(request("FILE_UPLOAD")).await.unwrap();
        h.fetcher.serve(FILE, 200, &format!("{}\n", initiated.token));

        let outcome = h.orchestrator.verify(&initiated.verification_id).await.unwrap();
        assert!(outcome.verified);
        assert_eq!(h.notifier.notified(), vec![DEV.to_string()]);

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.status, VerificationStatus::Verified);

        let mut saw_notification_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, VerificationEvent::NotificationFailed { .. }) {
                saw_notification_failure = true;
            }
        }
        assert!(saw_notification_failure);
    }

    #[tokio::test]
    async fn test_concurrent_verifies_never_exceed_max_retries() {
        let h = harness_with(
            NullResolver::new().with_delay(std::time::Duration::from_millis(10)),
            NullFetcher::new(),
            NullNotifier::new(),
        );
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let orchestrator = h.orchestrator.clone();
            let id = initiated.verification_id;
            handles.push(tokio::spawn(async move { orchestrator.verify(&id).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.retry_count, 3);
        assert_eq!(view.status, VerificationStatus::Failed);
        assert_eq!(h.resolver.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_verify_still_records_attempt() {
        let h = harness_with(
            NullResolver::new().with_delay(std::time::Duration::from_millis(50)),
            NullFetcher::new(),
            NullNotifier::new(),
        );
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();

        let cancelled = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            h.orchestrator.verify(&initiated.verification_id),
        )
        .await;
        assert!(cancelled.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        let view = h
            .orchestrator
            .get_status(&initiated.verification_id, DEV)
            .await
            .unwrap();
        assert_eq!(view.retry_count, 1);
        assert_eq!(h.resolver.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_latest_verified_picks_newest() {
        let h = harness();
        let first = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();
        h.resolver.add_records(TXT, &[first.token.as_str()]);
        h.orchestrator.verify(&first.verification_id).await.unwrap();

        h.clock.advance(Duration::hours(1));
        let second = h.orchestrator.initiate(request("FILE_UPLOAD")).await.unwrap();
        h.fetcher.serve(FILE, 200, &second.token);
        h.orchestrator.verify(&second.verification_id).await.unwrap();

        let latest = h
            .orchestrator
            .latest_verified(DEV, "EXAMPLE.com.")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.verification_id, second.verification_id.to_string());
        assert!(h
            .orchestrator
            .latest_verified(DEV, "other.org")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_hung_notifier_does_not_block_verify() {
        let h = harness_with(
            NullResolver::new(),
            NullFetcher::new(),
            NullNotifier::new().with_delay(std::time::Duration::from_secs(60)),
        );
        let mut events = h.orchestrator.subscribe();
        let initiated = h.orchestrator.initiate(request("DNS_TXT")).await.unwrap();
        h.resolver.add_records(TXT, &[initiated.token.as_str()]);

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            h.orchestrator.verify(&initiated.verification_id),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(outcome.verified);

        let mut timed_out = false;
        while let Ok(event) = events.try_recv() {
            if let VerificationEvent::NotificationFailed { message, .. } = event {
                timed_out |= message.contains("timed out");
            }
        }
        assert!(timed_out);

        // The proof lock was released: a second call returns promptly.
        let again = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            h.orchestrator.verify(&initiated.verification_id),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(again.verified);
    }
}
