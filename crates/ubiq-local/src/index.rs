//! Directory-backed metadata index
//!
//! Answers queries by scanning the scope directories of a container and keeps
//! them live with a `notify` watcher:
//!
//! ```text
//! inotify / kqueue
//!       │  (any non-access event)
//!       ▼
//!  notify callback ──→ change signal ──→ rescan task ──→ IndexNotification
//! ```
//!
//! The rescan task sends one `FinishedGathering` after the first scan and an
//! `Updated` whenever a rescan produces a different snapshot. Every item is
//! reported as fully downloaded and uploaded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use ubiq_core::domain::{DownloadStatus, RawEntry};
use ubiq_core::ports::{
    IMetadataIndex, IndexNotification, IndexRegistration, QuerySpec, WatchHandle,
};

/// Quiet period that coalesces bursts of filesystem events into one rescan
const RESCAN_SETTLE: Duration = Duration::from_millis(50);

/// Metadata index over plain directories
#[derive(Debug, Clone)]
pub struct LocalMetadataIndex {
    buffer: usize,
}

impl LocalMetadataIndex {
    /// Create an index whose queries buffer up to `buffer` notifications
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
        }
    }
}

impl Default for LocalMetadataIndex {
    fn default() -> Self {
        Self::new(64)
    }
}

// ============================================================================
// Scanning
// ============================================================================

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

fn entry_for(path: &Path, meta: &std::fs::Metadata) -> RawEntry {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let is_directory = meta.is_dir();
    RawEntry {
        path: path.to_path_buf(),
        is_hidden: name.as_deref().is_some_and(|n| n.starts_with('.')),
        is_directory,
        display_name: name.clone(),
        fs_name: name,
        fs_size: (!is_directory).then(|| meta.len()),
        creation_date: to_utc(meta.created()),
        content_change_date: to_utc(meta.modified()),
        has_unresolved_conflicts: Some(false),
        download_status: Some(DownloadStatus::Current),
        is_downloading: Some(false),
        is_uploaded: Some(true),
        is_uploading: Some(false),
        percent_uploaded: Some(100.0),
        percent_downloaded: Some(100.0),
        uploading_error: None,
        downloading_error: None,
    }
}

fn walk(dir: &Path, spec: &QuerySpec, out: &mut BTreeMap<PathBuf, RawEntry>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read directory during scan");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                trace!(path = %path.display(), error = %e, "Entry vanished during scan");
                continue;
            }
        };
        if spec.includes(&path) {
            out.insert(path.clone(), entry_for(&path, &meta));
        }
        if meta.is_dir() {
            walk(&path, spec, out);
        }
    }
}

/// Scans every scope of `spec`, returning matching entries ordered by path
///
/// Scopes overlap (documents lies inside data); each path appears once.
pub fn scan(spec: &QuerySpec) -> Vec<RawEntry> {
    let mut found = BTreeMap::new();
    for scope in &spec.scopes {
        let root = scope.root_in(&spec.root);
        if root.is_dir() {
            walk(&root, spec, &mut found);
        }
    }
    found.into_values().collect()
}

/// Scope roots to watch, dropping any root nested inside another
fn watch_roots(spec: &QuerySpec) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = spec
        .scopes
        .iter()
        .map(|s| s.root_in(&spec.root))
        .filter(|p| p.is_dir())
        .collect();
    roots.sort();
    roots.dedup();
    let all = roots.clone();
    roots.retain(|r| !all.iter().any(|other| other != r && r.starts_with(other)));
    roots
}

fn is_relevant(event: &notify::Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

// ============================================================================
// IMetadataIndex implementation
// ============================================================================

#[async_trait::async_trait]
impl IMetadataIndex for LocalMetadataIndex {
    async fn open(&self, spec: QuerySpec) -> Result<IndexRegistration> {
        if !spec.root.as_path().is_dir() {
            bail!("container root is not a directory: {}", spec.root);
        }

        let (changed_tx, mut changed_rx) = mpsc::unbounded_channel::<()>();
        let (tx, rx) = mpsc::channel(self.buffer);

        // Watch before the first scan so no change slips between the two.
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) if is_relevant(&event) => {
                    let _ = changed_tx.send(());
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "Metadata index watcher error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create metadata index watcher")?;

        for root in watch_roots(&spec) {
            watcher
                .watch(&root, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch scope root: {}", root.display()))?;
            debug!(root = %root.display(), "Watching scope root");
        }

        info!(predicate = %spec.predicate, "Local metadata query opened");

        tokio::spawn(async move {
            let scan_spec = spec.clone();
            let mut last = match tokio::task::spawn_blocking(move || scan(&scan_spec)).await {
                Ok(results) => results,
                Err(e) => {
                    error!(error = %e, "Initial scan failed");
                    return;
                }
            };
            if tx
                .send(IndexNotification::FinishedGathering(last.clone()))
                .await
                .is_err()
            {
                return;
            }

            while changed_rx.recv().await.is_some() {
                tokio::time::sleep(RESCAN_SETTLE).await;
                while changed_rx.try_recv().is_ok() {}

                let scan_spec = spec.clone();
                let results = match tokio::task::spawn_blocking(move || scan(&scan_spec)).await {
                    Ok(results) => results,
                    Err(e) => {
                        error!(error = %e, "Rescan failed");
                        continue;
                    }
                };
                if results == last {
                    trace!("Rescan produced identical snapshot");
                    continue;
                }
                last = results;
                if tx.send(IndexNotification::Updated(last.clone())).await.is_err() {
                    break;
                }
            }
            debug!("Local metadata query finished");
        });

        // Dropping the watcher drops the change sender and ends the task.
        let handle = WatchHandle::new(move || drop(watcher));

        Ok(IndexRegistration {
            notifications: rx,
            handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use ubiq_core::domain::{ContainerRoot, QueryPredicate, SearchScope};

    use super::*;

    fn setup() -> (TempDir, ContainerRoot) {
        let dir = TempDir::new().unwrap();
        let root = ContainerRoot::new(dir.path().join("c")).unwrap();
        std::fs::create_dir_all(root.as_path().join("Documents/sub")).unwrap();
        std::fs::write(root.as_path().join("data.bin"), b"0123").unwrap();
        std::fs::write(root.as_path().join("Documents/sub/a.txt"), b"a").unwrap();
        std::fs::write(root.as_path().join(".hidden"), b"h").unwrap();
        (dir, root)
    }

    fn prefix_spec(root: &ContainerRoot, scopes: Vec<SearchScope>) -> QuerySpec {
        QuerySpec {
            root: root.clone(),
            predicate: QueryPredicate::under(root),
            scopes,
        }
    }

    #[test]
    fn test_scan_union_has_no_duplicates() {
        let (_dir, root) = setup();
        let results = scan(&prefix_spec(&root, SearchScope::ALL.to_vec()));
        let paths: Vec<_> = results.iter().map(|e| e.path.clone()).collect();
        let mut unique = paths.clone();
        unique.dedup();
        assert_eq!(paths, unique);
        assert_eq!(paths.len(), 5);
    }

    #[test]
    fn test_scan_documents_scope_only() {
        let (_dir, root) = setup();
        let results = scan(&prefix_spec(&root, vec![SearchScope::Documents]));
        assert!(results
            .iter()
            .all(|e| e.path.starts_with(root.as_path().join("Documents"))));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_scan_marks_attributes() {
        let (_dir, root) = setup();
        let results = scan(&prefix_spec(&root, SearchScope::ALL.to_vec()));

        let data = results
            .iter()
            .find(|e| e.path.ends_with("data.bin"))
            .unwrap();
        assert_eq!(data.fs_size, Some(4));
        assert_eq!(data.download_status, Some(DownloadStatus::Current));
        assert_eq!(data.percent_uploaded, Some(100.0));
        assert!(!data.is_hidden);

        let docs = results
            .iter()
            .find(|e| e.path.ends_with("Documents"))
            .unwrap();
        assert!(docs.is_directory);
        assert_eq!(docs.fs_size, None);

        let hidden = results.iter().find(|e| e.path.ends_with(".hidden")).unwrap();
        assert!(hidden.is_hidden);
    }

    #[test]
    fn test_watch_roots_skip_nested() {
        let (_dir, root) = setup();
        let roots = watch_roots(&prefix_spec(&root, SearchScope::ALL.to_vec()));
        assert_eq!(roots, vec![root.as_path().to_path_buf()]);
    }

    #[tokio::test]
    async fn test_open_gathers_then_updates() {
        let (_dir, root) = setup();
        let index = LocalMetadataIndex::default();
        let spec = QuerySpec {
            root: root.clone(),
            predicate: QueryPredicate::ExactPath(root.as_path().join("new.txt")),
            scopes: SearchScope::ALL.to_vec(),
        };
        let mut reg = index.open(spec).await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), reg.notifications.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, IndexNotification::FinishedGathering(vec![]));

        std::fs::write(root.as_path().join("new.txt"), b"hello").unwrap();
        let update = tokio::time::timeout(Duration::from_secs(5), reg.notifications.recv())
            .await
            .unwrap()
            .unwrap();
        match update {
            IndexNotification::Updated(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].fs_size, Some(5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let root = ContainerRoot::new(dir.path().join("absent")).unwrap();
        let index = LocalMetadataIndex::default();
        assert!(index
            .open(prefix_spec(&root, SearchScope::ALL.to_vec()))
            .await
            .is_err());
    }
}
