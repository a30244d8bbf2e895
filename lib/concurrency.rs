//! Concurrency primitives shared by the distribution client: the pull gate, per-digest write
//! locks, and the tag-index lock (§5).

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedSemaphorePermit, RwLock, Semaphore};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Bounds the number of simultaneously active pulls.
#[derive(Debug, Clone)]
pub struct PullGate {
    semaphore: Arc<Semaphore>,
}

/// A keyed mutex table handing out one lock per blob digest, so concurrent pulls that share a
/// layer coalesce onto a single writer instead of racing to write the same file.
#[derive(Debug, Clone, Default)]
pub struct DigestLockTable {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// A guard returned by [`DigestLockTable::lock`]; holding it serializes writers for one digest.
pub struct DigestLockGuard {
    _inner: tokio::sync::OwnedMutexGuard<()>,
}

/// Single-writer, multi-reader lock over the tag index.
#[derive(Debug, Clone, Default)]
pub struct TagIndexLock {
    inner: Arc<RwLock<()>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PullGate {
    /// Creates a gate bounding concurrency at `max_concurrent`.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Acquires a permit, suspending until either one is free or `cancel` fires.
    ///
    /// Returns `None` if cancellation fired first; the caller should treat that as an
    /// [`crate::error::DistributionError::Interrupted`].
    pub async fn acquire(
        &self,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
            _ = cancel.cancelled() => None,
        }
    }

    /// The number of permits currently available (i.e. not held by an active pull).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl DigestLockTable {
    /// Acquires the lock for `digest`, creating its entry on first use.
    pub async fn lock(&self, digest: &str) -> DigestLockGuard {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(digest.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = entry.lock_owned().await;
        DigestLockGuard { _inner: guard }
    }
}

impl TagIndexLock {
    /// Acquires a shared (reader) lock over the tag index.
    pub async fn read(&self) -> tokio::sync::OwnedRwLockReadGuard<()> {
        self.inner.clone().read_owned().await
    }

    /// Acquires the exclusive (writer) lock over the tag index.
    pub async fn write(&self) -> tokio::sync::OwnedRwLockWriteGuard<()> {
        self.inner.clone().write_owned().await
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
