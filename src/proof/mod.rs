//! Verification proof data model.
//!
//! A [`VerificationProof`] is the single persistent record of one attempt to
//! prove control of a domain. It is created `PENDING` and only ever moves to
//! one of the terminal states:
//!
//! ```text
//! PENDING ──► VERIFIED
//!    │
//!    ├──────► FAILED    (retries exhausted)
//!    │
//!    └──────► EXPIRED   (checked after expires_at)
//! ```
//!
//! Records are never mutated in place by callers. All changes go through a
//! [`ProofPatch`] applied by the store.

mod domain;
mod instructions;
mod token;

pub use domain::normalize_domain;
pub use instructions::render_instructions;
pub use token::{TokenGenerator, TOKEN_PREFIX};

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque proof identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofId(Uuid);

impl ProofId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProofId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ProofId {
    type Err = Error;

    /// A malformed id cannot name any proof, so it is reported as not found.
    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::NotFound(s.to_string()))
    }
}

/// How ownership of the domain is proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationType {
    /// TXT record at a well-known subdomain.
    DnsTxt,
    /// Meta tag in the homepage `<head>`.
    MetaTag,
    /// Plain-text file at a well-known path.
    FileUpload,
    /// No automated check; a human reviews the claim.
    ManualReview,
}

impl VerificationType {
    /// All supported types.
    pub const ALL: [Self; 4] = [
        Self::DnsTxt,
        Self::MetaTag,
        Self::FileUpload,
        Self::ManualReview,
    ];

    /// Canonical wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DnsTxt => "DNS_TXT",
            Self::MetaTag => "META_TAG",
            Self::FileUpload => "FILE_UPLOAD",
            Self::ManualReview => "MANUAL_REVIEW",
        }
    }

    /// Returns true if the engine checks this type's evidence itself.
    #[must_use]
    pub fn is_automated(&self) -> bool {
        !matches!(self, Self::ManualReview)
    }
}

impl fmt::Display for VerificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationType {
    type Err = Error;

    /// Accepts the canonical names case-insensitively, with `-` or `_`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::InvalidVerificationType(s.to_string()))
    }
}

/// Lifecycle state of a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Awaiting a successful check.
    Pending,
    /// Evidence matched the token.
    Verified,
    /// Retries exhausted.
    Failed,
    /// Checked after the token expired.
    Expired,
}

impl VerificationStatus {
    /// Canonical wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Returns true for states no automated transition leaves.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit metadata captured when a proof is verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationData {
    /// Method that produced the successful check.
    pub method: VerificationType,
    /// When the check succeeded.
    pub verified_at: DateTime<Utc>,
}

/// One verification attempt record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationProof {
    /// Proof id.
    pub id: ProofId,
    /// Owning developer.
    pub developer_id: String,
    /// Associated app, owned by `developer_id`.
    pub app_id: Option<String>,
    /// Normalized claimed hostname.
    pub domain: String,
    /// Proof method.
    pub verification_type: VerificationType,
    /// Token the evidence must contain.
    pub verification_token: String,
    /// Lifecycle state.
    pub status: VerificationStatus,
    /// Failed checks so far.
    pub retry_count: u32,
    /// Failed checks allowed.
    pub max_retries: u32,
    /// Last failure, cleared on success.
    pub failure_reason: Option<String>,
    /// Captured on success.
    pub verification_data: Option<VerificationData>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Fixed at creation; never extended.
    pub expires_at: DateTime<Utc>,
    /// Time of the successful check.
    pub verified_at: Option<DateTime<Utc>>,
    /// Time of the last update.
    pub updated_at: DateTime<Utc>,
    /// Bumped on every update; used for optimistic concurrency.
    pub revision: u64,
}

impl VerificationProof {
    /// Returns true if a check at `now` must be treated as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns true once no further checks are allowed.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Returns true if `developer_id` owns this proof.
    #[must_use]
    pub fn is_owned_by(&self, developer_id: &str) -> bool {
        self.developer_id == developer_id
    }

    /// Apply a patch, enforcing the terminal-state and retry-bound invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the proof is already terminal or the
    /// patch would push `retry_count` past `max_retries`.
    pub fn apply(&mut self, patch: &ProofPatch, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "proof {} is already {}",
                self.id, self.status
            )));
        }
        if let Some(retry_count) = patch.retry_count {
            if retry_count > self.max_retries {
                return Err(Error::Conflict(format!(
                    "retry count {retry_count} exceeds limit {} for proof {}",
                    self.max_retries, self.id
                )));
            }
            self.retry_count = retry_count;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref reason) = patch.failure_reason {
            self.failure_reason.clone_from(reason);
        }
        if let Some(ref data) = patch.verification_data {
            self.verified_at = Some(data.verified_at);
            self.verification_data = Some(data.clone());
        }
        self.updated_at = now;
        self.revision += 1;
        Ok(())
    }
}

/// An explicit set of field changes applied atomically by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofPatch {
    /// New status.
    pub status: Option<VerificationStatus>,
    /// New retry count.
    pub retry_count: Option<u32>,
    /// New failure reason; `Some(None)` clears it.
    pub failure_reason: Option<Option<String>>,
    /// Success metadata; also sets `verified_at`.
    pub verification_data: Option<VerificationData>,
}

impl ProofPatch {
    /// Mark the proof verified.
    #[must_use]
    pub fn verified(method: VerificationType, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(VerificationStatus::Verified),
            failure_reason: Some(None),
            verification_data: Some(VerificationData {
                method,
                verified_at: at,
            }),
            ..Self::default()
        }
    }

    /// Record one failed check. The proof fails once `retry_count`
    /// reaches `max_retries`.
    #[must_use]
    pub fn attempt_failed(retry_count: u32, max_retries: u32, reason: String) -> Self {
        let status = (retry_count >= max_retries).then_some(VerificationStatus::Failed);
        Self {
            status,
            retry_count: Some(retry_count),
            failure_reason: Some(Some(reason)),
            ..Self::default()
        }
    }

    /// Mark the proof expired.
    #[must_use]
    pub fn expired(reason: &str) -> Self {
        Self {
            status: Some(VerificationStatus::Expired),
            failure_reason: Some(Some(reason.to_string())),
            ..Self::default()
        }
    }

    /// Mark the proof failed without consuming a retry.
    #[must_use]
    pub fn retries_exhausted(reason: &str) -> Self {
        Self {
            status: Some(VerificationStatus::Failed),
            failure_reason: Some(Some(reason.to_string())),
            ..Self::default()
        }
    }
}

/// Read-only projection of a proof returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofView {
    /// Proof id.
    pub verification_id: String,
    /// Owning developer.
    pub developer_id: String,
    /// Associated app.
    pub app_id: Option<String>,
    /// Claimed hostname.
    pub domain: String,
    /// Proof method.
    pub verification_type: VerificationType,
    /// Lifecycle state.
    pub status: VerificationStatus,
    /// Token the evidence must contain.
    pub token: String,
    /// Failed checks so far.
    pub retry_count: u32,
    /// Failed checks allowed.
    pub max_retries: u32,
    /// Last failure.
    pub failure_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Time of the successful check.
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<&VerificationProof> for ProofView {
    fn from(proof: &VerificationProof) -> Self {
        Self {
            verification_id: proof.id.to_string(),
            developer_id: proof.developer_id.clone(),
            app_id: proof.app_id.clone(),
            domain: proof.domain.clone(),
            verification_type: proof.verification_type,
            status: proof.status,
            token: proof.verification_token.clone(),
            retry_count: proof.retry_count,
            max_retries: proof.max_retries,
            failure_reason: proof.failure_reason.clone(),
            created_at: proof.created_at,
            expires_at: proof.expires_at,
            verified_at: proof.verified_at,
        }
    }
}
