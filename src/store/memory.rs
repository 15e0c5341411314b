//! In-process proof store.

use super::{ProofStore, ProofTable};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::proof::{ProofId, ProofPatch, VerificationProof};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Proof store held entirely in memory.
///
/// Cloning shares the underlying table.
#[derive(Clone)]
pub struct MemoryProofStore {
    inner: Arc<Mutex<ProofTable>>,
    clock: Arc<dyn Clock>,
}

impl MemoryProofStore {
    /// Create an empty store stamping updates with wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping updates with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ProofTable::default())),
            clock,
        }
    }

    /// Number of stored proofs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryProofStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProofStore for MemoryProofStore {
    async fn create(&self, proof: VerificationProof) -> Result<()> {
        self.inner.lock().insert(proof)
    }

    async fn load(&self, id: &ProofId) -> Result<VerificationProof> {
        self.inner.lock().get(id)
    }

    async fn update(
        &self,
        id: &ProofId,
        expected_revision: u64,
        patch: &ProofPatch,
    ) -> Result<VerificationProof> {
        let now = self.clock.now();
        self.inner.lock().update(id, expected_revision, patch, now)
    }

    async fn list_by_developer(&self, developer_id: &str) -> Result<Vec<VerificationProof>> {
        Ok(self.inner.lock().by_developer(developer_id))
    }

    async fn delete(&self, id: &ProofId, developer_id: &str) -> Result<bool> {
        Ok(self.inner.lock().remove(id, developer_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::proof::tests::sample_proof;
    use crate::proof::VerificationStatus;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_create_and_load() {
        let store = MemoryProofStore::new();
        let proof = sample_proof("dev-1", Utc::now());
        let id = proof.id;

        store.create(proof.clone()).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), proof);
        assert_eq!(store.len(), 1);

        let err = store.create(proof).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = MemoryProofStore::new();
        let err = store.load(&ProofId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_checks_revision() {
        let store = MemoryProofStore::new();
        let proof = sample_proof("dev-1", Utc::now());
        let id = proof.id;
        store.create(proof).await.unwrap();

        let patch = ProofPatch::attempt_failed(1, 3, "mismatch".into());
        let updated = store.update(&id, 0, &patch).await.unwrap();
        assert_eq!(updated.revision, 1);
        assert_eq!(updated.retry_count, 1);

        // A second writer holding revision 0 loses.
        let err = store.update(&id, 0, &patch).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.load(&id).await.unwrap().retry_count, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_terminal() {
        let store = MemoryProofStore::new();
        let proof = sample_proof("dev-1", Utc::now());
        let id = proof.id;
        store.create(proof).await.unwrap();

        store
            .update(&id, 0, &ProofPatch::expired("expired"))
            .await
            .unwrap();
        let err = store
            .update(&id, 1, &ProofPatch::attempt_failed(1, 3, "x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let stored = store.load(&id).await.unwrap();
        assert_eq!(stored.status, VerificationStatus::Expired);
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn test_list_newest_first_per_developer() {
        let store = MemoryProofStore::new();
        let now = Utc::now();
        let old = sample_proof("dev-1", now - Duration::hours(2));
        let new = sample_proof("dev-1", now);
        let other = sample_proof("dev-2", now);
        for p in [old.clone(), new.clone(), other] {
            store.create(p).await.unwrap();
        }

        let listed = store.list_by_developer("dev-1").await.unwrap();
        let ids: Vec<ProofId> = listed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
        assert!(store.list_by_developer("dev-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let store = MemoryProofStore::new();
        let proof = sample_proof("dev-1", Utc::now());
        let id = proof.id;
        store.create(proof).await.unwrap();

        assert!(!store.delete(&id, "dev-2").await.unwrap());
        assert!(store.load(&id).await.is_ok());

        assert!(store.delete(&id, "dev-1").await.unwrap());
        assert!(store.is_empty());
        assert!(!store.delete(&id, "dev-1").await.unwrap());
    }
}
