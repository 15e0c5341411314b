//! File-backed proof store.
//!
//! The table lives in a single MessagePack snapshot. Every operation takes
//! an OS advisory lock on a sidecar `<snapshot>.lock` file and re-reads the
//! snapshot under it, so several processes can share one store: writers are
//! serialized and always apply their revision check to the latest table.
//!
//! Snapshots are written to a temp file in the same directory and renamed
//! over the old one, so a crash leaves either the previous or the new table
//! on disk, never a torn write.

use super::{ProofStore, ProofTable};
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::proof::{ProofId, ProofPatch, VerificationProof};
use async_trait::async_trait;
use fd_lock::RwLock as FileLock;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Proof store persisted to a single snapshot file.
pub struct FileProofStore {
    path: PathBuf,
    lock: Mutex<FileLock<File>>,
    clock: Arc<dyn Clock>,
}

impl FileProofStore {
    /// Open the store at `path`, checking an existing snapshot if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or lock file cannot be
    /// created or the snapshot cannot be read or decoded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open the store at `path`, stamping updates with `clock`.
    ///
    /// # Errors
    ///
    /// See [`FileProofStore::open`].
    pub fn open_with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path(&path))?;

        let store = Self {
            path,
            lock: Mutex::new(FileLock::new(lock_file)),
            clock,
        };

        let count = store.read(|table| Ok(table.len()))?;
        if count > 0 {
            info!(
                "Loaded {count} verification proofs from {}",
                store.path.display()
            );
        } else {
            debug!("Proof store at {} is empty", store.path.display());
        }
        Ok(store)
    }

    /// Snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the current snapshot under a shared lock.
    fn read<T>(&self, op: impl FnOnce(&ProofTable) -> Result<T>) -> Result<T> {
        let lock = self.lock.lock();
        let _guard = lock.read()?;
        let table = self.load_snapshot()?;
        op(&table)
    }

    /// Run `op` against the current snapshot under an exclusive lock and
    /// write the result back. Nothing is written if `op` fails.
    fn mutate<T>(&self, op: impl FnOnce(&mut ProofTable) -> Result<T>) -> Result<T> {
        let mut lock = self.lock.lock();
        let _guard = lock.write()?;
        let mut table = self.load_snapshot()?;
        let out = op(&mut table)?;
        self.persist(&table)?;
        Ok(out)
    }

    fn load_snapshot(&self) -> Result<ProofTable> {
        if !self.path.exists() {
            return Ok(ProofTable::default());
        }
        let bytes = std::fs::read(&self.path)?;
        let records: Vec<VerificationProof> = rmp_serde::from_slice(&bytes).map_err(|e| {
            Error::Storage(format!("corrupt snapshot {}: {e}", self.path.display()))
        })?;
        Ok(ProofTable::from_records(records))
    }

    fn persist(&self, table: &ProofTable) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(&table.records())
            .map_err(|e| Error::Storage(format!("failed to encode snapshot: {e}")))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("proofs"), OsString::from);
    name.push(".lock");
    path.with_file_name(name)
}

#[async_trait]
impl ProofStore for FileProofStore {
    async fn create(&self, proof: VerificationProof) -> Result<()> {
        self.mutate(|table| table.insert(proof))
    }

    async fn load(&self, id: &ProofId) -> Result<VerificationProof> {
        self.read(|table| table.get(id))
    }

    async fn update(
        &self,
        id: &ProofId,
        expected_revision: u64,
        patch: &ProofPatch,
    ) -> Result<VerificationProof> {
        let now = self.clock.now();
        self.mutate(|table| table.update(id, expected_revision, patch, now))
    }

    async fn list_by_developer(&self, developer_id: &str) -> Result<Vec<VerificationProof>> {
        self.read(|table| Ok(table.by_developer(developer_id)))
    }

    async fn delete(&self, id: &ProofId, developer_id: &str) -> Result<bool> {
        let owned = self.read(|table| Ok(table.get(id).is_ok_and(|p| p.is_owned_by(developer_id))))?;
        if !owned {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.remove(id, developer_id)))
    }
}
