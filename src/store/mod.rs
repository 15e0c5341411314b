//! Durable storage for verification proofs.
//!
//! The store is the only shared mutable state in the engine. Updates are
//! explicit [`ProofPatch`]es guarded by the record's `revision`, so two
//! writers that loaded the same revision cannot both apply a change.

mod file;
mod memory;

pub use file::FileProofStore;
pub use memory::MemoryProofStore;

use crate::error::{Error, Result};
use crate::proof::{ProofId, ProofPatch, VerificationProof};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Storage for [`VerificationProof`] records.
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Insert a new proof.
    ///
    /// Fails with [`Error::Conflict`] only if the id is already taken.
    async fn create(&self, proof: VerificationProof) -> Result<()>;

    /// Load a proof by id; [`Error::NotFound`] if absent.
    async fn load(&self, id: &ProofId) -> Result<VerificationProof>;

    /// Apply `patch` if the stored revision still equals `expected_revision`.
    ///
    /// Returns the updated record. Fails with [`Error::Conflict`] when the
    /// revision moved on or the record is already terminal.
    async fn update(
        &self,
        id: &ProofId,
        expected_revision: u64,
        patch: &ProofPatch,
    ) -> Result<VerificationProof>;

    /// All proofs owned by `developer_id`, newest first.
    async fn list_by_developer(&self, developer_id: &str) -> Result<Vec<VerificationProof>>;

    /// Delete a proof if `developer_id` owns it. Returns whether it was removed.
    async fn delete(&self, id: &ProofId, developer_id: &str) -> Result<bool>;
}

/// In-memory proof table shared by the store implementations.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProofTable {
    proofs: HashMap<ProofId, VerificationProof>,
}

impl ProofTable {
    pub(crate) fn from_records(records: Vec<VerificationProof>) -> Self {
        Self {
            proofs: records.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub(crate) fn records(&self) -> Vec<&VerificationProof> {
        self.proofs.values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.proofs.len()
    }

    pub(crate) fn insert(&mut self, proof: VerificationProof) -> Result<()> {
        if self.proofs.contains_key(&proof.id) {
            return Err(Error::Conflict(format!("proof {} already exists", proof.id)));
        }
        self.proofs.insert(proof.id, proof);
        Ok(())
    }

    pub(crate) fn get(&self, id: &ProofId) -> Result<VerificationProof> {
        self.proofs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub(crate) fn update(
        &mut self,
        id: &ProofId,
        expected_revision: u64,
        patch: &ProofPatch,
        now: DateTime<Utc>,
    ) -> Result<VerificationProof> {
        let proof = self
            .proofs
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if proof.revision != expected_revision {
            return Err(Error::Conflict(format!(
                "proof {id} is at revision {}, expected {expected_revision}",
                proof.revision
            )));
        }

        // Apply to a copy so a rejected patch leaves the record untouched.
        let mut updated = proof.clone();
        updated.apply(patch, now)?;
        *proof = updated.clone();
        Ok(updated)
    }

    pub(crate) fn by_developer(&self, developer_id: &str) -> Vec<VerificationProof> {
        let mut proofs: Vec<VerificationProof> = self
            .proofs
            .values()
            .filter(|p| p.is_owned_by(developer_id))
            .cloned()
            .collect();
        proofs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        proofs
    }

    pub(crate) fn remove(&mut self, id: &ProofId, developer_id: &str) -> bool {
        match self.proofs.get(id) {
            Some(proof) if proof.is_owned_by(developer_id) => {
                self.proofs.remove(id);
                true
            }
            _ => false,
        }
    }
}
