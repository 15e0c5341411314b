//! Verification lifecycle events.

use crate::proof::{ProofId, VerificationType};
use tokio::sync::broadcast;

/// Events emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationEvent {
    /// A new proof was created.
    Initiated {
        /// Proof id.
        id: ProofId,
        /// Owning developer.
        developer_id: String,
        /// Claimed domain.
        domain: String,
        /// Proof method.
        method: VerificationType,
    },

    /// Evidence matched; the proof is verified.
    Verified {
        /// Proof id.
        id: ProofId,
        /// Owning developer.
        developer_id: String,
        /// Verified domain.
        domain: String,
        /// Proof method.
        method: VerificationType,
    },

    /// A check failed and consumed a retry.
    AttemptFailed {
        /// Proof id.
        id: ProofId,
        /// Failed checks so far.
        retry_count: u32,
        /// Failure message.
        reason: String,
    },

    /// Retries are exhausted; the proof is failed.
    Failed {
        /// Proof id.
        id: ProofId,
    },

    /// The proof was checked after its token expired.
    Expired {
        /// Proof id.
        id: ProofId,
    },

    /// The owner deleted the proof.
    Deleted {
        /// Proof id.
        id: ProofId,
    },

    /// Post-verification notification failed; the proof stays verified.
    NotificationFailed {
        /// Proof id.
        id: ProofId,
        /// Error message.
        message: String,
    },
}

/// Channel for receiving verification events.
pub type VerificationEventsChannel = broadcast::Receiver<VerificationEvent>;

/// Sender for verification events.
pub type VerificationEventsSender = broadcast::Sender<VerificationEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (VerificationEventsSender, VerificationEventsChannel) {
    broadcast::channel(256)
}
