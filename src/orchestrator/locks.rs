//! Per-proof async locks.
//!
//! Serializes `verify`/`delete` on the same proof inside one process while
//! leaving different proofs fully parallel. Entries are dropped once no task
//! holds or waits on them.

use crate::proof::ProofId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap = HashMap<ProofId, Arc<AsyncMutex<()>>>;

#[derive(Default)]
pub(crate) struct ProofLocks {
    map: Arc<Mutex<LockMap>>,
}

impl ProofLocks {
    pub(crate) async fn lock(&self, id: ProofId) -> ProofLockGuard {
        let mutex = Arc::clone(self.map.lock().entry(id).or_default());
        let guard = Arc::clone(&mutex).lock_owned().await;
        ProofLockGuard {
            id,
            map: Arc::clone(&self.map),
            mutex,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}

pub(crate) struct ProofLockGuard {
    id: ProofId,
    map: Arc<Mutex<LockMap>>,
    mutex: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProofLockGuard {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        self.guard.take();
        // Only the map and this guard still reference the mutex: nobody is waiting.
        if Arc::strong_count(&self.mutex) == 2 {
            map.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = Arc::new(ProofLocks::default());
        let id = ProofId::new();

        let first = locks.lock(id).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = ProofLocks::default();
        let _a = locks.lock(ProofId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(ProofId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
