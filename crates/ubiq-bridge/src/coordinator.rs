//! Per-path write coordination
//!
//! Serializes mutations of the same path across concurrent operations so a
//! delete, move, or copy never interleaves with another one on that path.
//! Locks are created on demand and pruned once no guard refers to them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Exclusive write access to one path, released on drop
#[derive(Debug)]
pub struct WriteGuard {
    path: PathBuf,
    _lock: OwnedMutexGuard<()>,
}

impl WriteGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Grants per-path write access
#[derive(Debug, Default)]
pub struct FileCoordinator {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FileCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive write access to `path`
    pub async fn coordinate_write(&self, path: &Path) -> WriteGuard {
        self.prune();
        let lock = Arc::clone(
            self.locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        trace!(path = %path.display(), "Waiting for write access");
        WriteGuard {
            path: path.to_path_buf(),
            _lock: lock.lock_owned().await,
        }
    }

    /// Waits for write access to both paths of a move
    ///
    /// Locks are taken in path order, so two moves over the same pair in
    /// opposite directions cannot deadlock. A pair of equal paths takes a
    /// single lock.
    pub async fn coordinate_pair(&self, a: &Path, b: &Path) -> (WriteGuard, Option<WriteGuard>) {
        if a == b {
            return (self.coordinate_write(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.coordinate_write(first).await;
        let second = self.coordinate_write(second).await;
        (first, Some(second))
    }

    /// Number of paths with a lock entry
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }

    /// Drops lock entries nobody holds or waits on
    fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}
