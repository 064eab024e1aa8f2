//! Integration tests: CloudBridge over the local directory adapters
//!
//! Containers live in a temporary directory. Transfer progress is scripted
//! through a `MemoryIndex`, except where the real `LocalMetadataIndex` is
//! the point of the test.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use ubiq_bridge::{BridgeError, ChannelEvent, CloudBridge};
use tokio::sync::mpsc;
use ubiq_core::domain::{DownloadStatus, RawEntry};
use ubiq_core::ports::{IMetadataIndex, IndexNotification, IndexRegistration, QuerySpec, WatchHandle};
use ubiq_local::{DirectoryContainerResolver, LocalCloudStore, LocalMetadataIndex};
use ubiq_query::MemoryIndex;

struct Harness {
    _dir: TempDir,
    base: PathBuf,
    root: PathBuf,
    index: Arc<MemoryIndex>,
    bridge: CloudBridge,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let base = dir.path().to_path_buf();
    let root = base.join("iCloud.app");
    std::fs::create_dir_all(root.join("Documents")).unwrap();

    let index = Arc::new(MemoryIndex::new());
    let bridge = CloudBridge::new(
        Arc::new(DirectoryContainerResolver::new(&base, true)),
        Arc::new(LocalCloudStore::new()),
        index.clone(),
    );
    Harness {
        _dir: dir,
        base,
        root,
        index,
        bridge,
    }
}

/// Index that replays a fixed script to each query, then ends its stream
struct ScriptedIndex(Vec<IndexNotification>);

#[async_trait::async_trait]
impl IMetadataIndex for ScriptedIndex {
    async fn open(&self, _spec: QuerySpec) -> anyhow::Result<IndexRegistration> {
        let (tx, rx) = mpsc::channel(self.0.len().max(1));
        for notification in &self.0 {
            tx.send(notification.clone()).await?;
        }
        Ok(IndexRegistration {
            notifications: rx,
            handle: WatchHandle::new(|| {}),
        })
    }
}

fn scripted_bridge(base: &Path, script: Vec<IndexNotification>) -> CloudBridge {
    CloudBridge::new(
        Arc::new(DirectoryContainerResolver::new(base, true)),
        Arc::new(LocalCloudStore::new()),
        Arc::new(ScriptedIndex(script)),
    )
}

fn listen(bridge: &CloudBridge, name: &str) -> UnboundedReceiver<ChannelEvent> {
    bridge.create_event_channel(name).unwrap();
    bridge.registry().lookup(name).unwrap().listen().unwrap()
}

async fn next(rx: &mut UnboundedReceiver<ChannelEvent>) -> Option<ChannelEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
}

async fn drain(rx: &mut UnboundedReceiver<ChannelEvent>) -> Vec<ChannelEvent> {
    let mut events = Vec::new();
    while let Some(event) = next(rx).await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_upload_streams_progress_to_end() {
    let h = harness();
    let local = h.base.join("big.bin");
    std::fs::write(&local, vec![7u8; 10 * 1024 * 1024]).unwrap();
    let mut rx = listen(&h.bridge, "up1");

    h.bridge
        .upload("iCloud.app", &local, "Documents/big.bin", Some("up1"))
        .await
        .unwrap();

    let cloud = h.root.join("Documents/big.bin");
    assert_eq!(std::fs::metadata(&cloud).unwrap().len(), 10 * 1024 * 1024);

    for percent in [0.0, 25.0, 20.0, 70.0, 100.0] {
        h.index.upsert(RawEntry {
            percent_uploaded: Some(percent),
            is_uploading: Some(percent < 100.0),
            ..RawEntry::new(&cloud)
        });
    }

    let events = drain(&mut rx).await;
    assert_eq!(
        events,
        vec![
            ChannelEvent::Progress(0.0),
            ChannelEvent::Progress(25.0),
            ChannelEvent::Progress(70.0),
            ChannelEvent::Progress(100.0),
            ChannelEvent::EndOfStream,
        ]
    );
    assert!(h.bridge.registry().lookup("up1").is_none());
    assert_eq!(h.index.live_query_count(), 0);
}

#[tokio::test]
async fn test_upload_replaces_existing_item() {
    let h = harness();
    let local = h.base.join("new.txt");
    std::fs::write(&local, b"new").unwrap();
    std::fs::write(h.root.join("notes.txt"), b"old contents").unwrap();

    h.bridge
        .upload("iCloud.app", &local, "notes.txt", None)
        .await
        .unwrap();
    assert_eq!(std::fs::read(h.root.join("notes.txt")).unwrap(), b"new");
    assert_eq!(h.index.open_count(), 0);
}

#[tokio::test]
async fn test_upload_of_missing_local_file_fails_and_frees_channel() {
    let h = harness();
    let _rx = listen(&h.bridge, "up2");

    let err = h
        .bridge
        .upload("iCloud.app", &h.base.join("absent"), "x.bin", Some("up2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "E_NAT");
    assert!(h.bridge.registry().lookup("up2").is_none());
}

#[tokio::test]
async fn test_download_of_resident_file_ends_immediately() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("iCloud.app");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("report.pdf"), b"%PDF").unwrap();

    let bridge = CloudBridge::new(
        Arc::new(DirectoryContainerResolver::new(dir.path(), true)),
        Arc::new(LocalCloudStore::new()),
        Arc::new(LocalMetadataIndex::default()),
    );
    let mut rx = listen(&bridge, "d1");

    let local = dir.path().join("out/report.pdf");
    bridge
        .download("iCloud.app", "report.pdf", &local, Some("d1"))
        .await
        .unwrap();

    let events = drain(&mut rx).await;
    assert_eq!(
        events,
        vec![ChannelEvent::Progress(100.0), ChannelEvent::EndOfStream]
    );
    assert_eq!(std::fs::read(&local).unwrap(), b"%PDF");
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn test_download_overwrites_local_destination() {
    let h = harness();
    let source = h.root.join("a.txt");
    std::fs::write(&source, b"cloud").unwrap();
    let local = h.base.join("a.txt");
    std::fs::write(&local, b"stale").unwrap();
    let mut rx = listen(&h.bridge, "d2");

    h.bridge
        .download("iCloud.app", "a.txt", &local, Some("d2"))
        .await
        .unwrap();
    h.index.upsert(RawEntry {
        percent_downloaded: Some(40.0),
        download_status: Some(DownloadStatus::Downloading),
        ..RawEntry::new(&source)
    });
    h.index.update(&source, |e| {
        e.percent_downloaded = Some(100.0);
        e.download_status = Some(DownloadStatus::Current);
    });

    let events = drain(&mut rx).await;
    assert_eq!(
        events,
        vec![
            ChannelEvent::Progress(40.0),
            ChannelEvent::Progress(100.0),
            ChannelEvent::EndOfStream,
        ]
    );
    assert_eq!(std::fs::read(&local).unwrap(), b"cloud");
}

#[tokio::test]
async fn test_cancel_stops_in_flight_download() {
    let h = harness();
    let source = h.root.join("movie.mov");
    std::fs::write(&source, b"stub").unwrap();
    h.index.upsert(RawEntry {
        percent_downloaded: Some(10.0),
        download_status: Some(DownloadStatus::Downloading),
        ..RawEntry::new(&source)
    });
    let mut rx = listen(&h.bridge, "d3");

    h.bridge
        .download_in_place("iCloud.app", "movie.mov", Some("d3"))
        .await
        .unwrap();
    assert_eq!(next(&mut rx).await, Some(ChannelEvent::Progress(10.0)));

    assert!(h.bridge.cancel("d3"));
    assert_eq!(next(&mut rx).await, None);
    assert_eq!(h.index.stop_count(), 1);
    assert_eq!(h.index.live_query_count(), 0);

    // Materialization finishing later reaches nobody.
    h.index.update(&source, |e| {
        e.percent_downloaded = Some(100.0);
        e.download_status = Some(DownloadStatus::Current);
    });
    assert!(h.bridge.registry().lookup("d3").is_none());

    // The name is free for a new operation.
    let mut again = listen(&h.bridge, "d3");
    h.bridge
        .download_in_place("iCloud.app", "movie.mov", Some("d3"))
        .await
        .unwrap();
    assert_eq!(
        drain(&mut again).await,
        vec![ChannelEvent::Progress(100.0), ChannelEvent::EndOfStream]
    );
}

#[tokio::test]
async fn test_delete_missing_path_leaves_registry_alone() {
    let h = harness();
    let _rx = listen(&h.bridge, "keep");
    std::fs::write(h.root.join("a.txt"), b"a").unwrap();

    let err = h
        .bridge
        .delete("iCloud.app", &["a.txt".to_string(), "ghost.txt".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::FileNotFound(h.root.join("ghost.txt")));
    assert_eq!(err.code(), "E_FNF");
    assert!(!h.root.join("a.txt").exists());

    let keep = h.bridge.registry().lookup("keep").unwrap();
    assert!(!keep.is_closed());
    assert_eq!(h.bridge.registry().names(), vec!["keep".to_string()]);
}

#[tokio::test]
async fn test_move_into_new_directory() {
    let h = harness();
    std::fs::write(h.root.join("a.txt"), b"a").unwrap();

    h.bridge
        .move_item("iCloud.app", "a.txt", "Documents/archive/2024/a.txt")
        .await
        .unwrap();
    assert!(!h.root.join("a.txt").exists());
    assert_eq!(
        std::fs::read(h.root.join("Documents/archive/2024/a.txt")).unwrap(),
        b"a"
    );

    let err = h
        .bridge
        .move_item("iCloud.app", "a.txt", "b.txt")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "E_NAT");
}

#[tokio::test]
async fn test_gather_with_live_updates_until_cancelled() {
    let h = harness();
    h.index.upsert(RawEntry::new(h.root.join("a.txt")));
    let mut rx = listen(&h.bridge, "g1");

    let records = h.bridge.gather("iCloud.app", Some("g1")).await.unwrap();
    assert_eq!(records.len(), 1);

    h.index.upsert(RawEntry::new(h.root.join("Documents/b.txt")));
    match next(&mut rx).await {
        Some(ChannelEvent::Files(files)) => {
            let mut names: Vec<_> = files.iter().map(|f| f.relative_path.clone()).collect();
            names.sort();
            assert_eq!(names, vec!["Documents/b.txt", "a.txt"]);
        }
        other => panic!("unexpected {other:?}"),
    }

    assert!(h.bridge.cancel("g1"));
    assert_eq!(next(&mut rx).await, None);
    assert_eq!(h.index.live_query_count(), 0);
}

#[tokio::test]
async fn test_gather_local_container() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("iCloud.app");
    std::fs::create_dir_all(root.join("Documents")).unwrap();
    std::fs::write(root.join("Documents/letter.txt"), b"dear").unwrap();
    std::fs::write(root.join(".DS_Store"), b"").unwrap();

    let bridge = CloudBridge::new(
        Arc::new(DirectoryContainerResolver::new(dir.path(), true)),
        Arc::new(LocalCloudStore::new()),
        Arc::new(LocalMetadataIndex::default()),
    );
    let mut records = bridge.gather("iCloud.app", None).await.unwrap();
    records.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let paths: Vec<_> = records.iter().map(|r| r.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["Documents", "Documents/letter.txt"]);
    for record in &records {
        assert_eq!(
            Path::new(&format!("{}/{}", root.display(), record.relative_path)),
            record.absolute_path
        );
    }
    let letter = &records[1];
    assert_eq!(letter.size_in_bytes, Some(4));
    assert_eq!(letter.download_status, Some(DownloadStatus::Current));
}

#[tokio::test]
async fn test_signed_out_rejects_every_operation() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("iCloud.app")).unwrap();
    let bridge = CloudBridge::new(
        Arc::new(DirectoryContainerResolver::new(dir.path(), false)),
        Arc::new(LocalCloudStore::new()),
        Arc::new(MemoryIndex::new()),
    );

    assert_eq!(bridge.gather("iCloud.app", None).await.unwrap_err().code(), "E_CTR");
    assert_eq!(
        bridge
            .download_in_place("iCloud.app", "a", None)
            .await
            .unwrap_err()
            .code(),
        "E_CTR"
    );
    assert_eq!(
        bridge
            .move_item("iCloud.app", "a", "b")
            .await
            .unwrap_err()
            .code(),
        "E_CTR"
    );
}

#[tokio::test]
async fn test_download_fails_when_index_ends_query() {
    let h = harness();
    let cloud = h.root.join("Documents/remote.bin");
    std::fs::write(&cloud, b"partial").unwrap();
    let bridge = scripted_bridge(
        &h.base,
        vec![IndexNotification::FinishedGathering(vec![RawEntry {
            percent_downloaded: Some(10.0),
            download_status: Some(DownloadStatus::Downloading),
            ..RawEntry::new(&cloud)
        }])],
    );
    let mut rx = listen(&bridge, "d1");

    bridge
        .download_in_place("iCloud.app", "Documents/remote.bin", Some("d1"))
        .await
        .unwrap();

    let events = drain(&mut rx).await;
    assert_eq!(events.first(), Some(&ChannelEvent::Progress(10.0)));
    match events.last() {
        Some(ChannelEvent::Error { code, .. }) => assert_eq!(code, "E_NAT"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(events.len(), 2);
    assert!(bridge.registry().is_empty());
}

#[tokio::test]
async fn test_gather_fails_when_index_ends_before_gathering() {
    let h = harness();
    let bridge = scripted_bridge(&h.base, Vec::new());
    let mut rx = listen(&bridge, "g1");

    let err = bridge.gather("iCloud.app", Some("g1")).await.unwrap_err();
    assert_eq!(err.code(), "E_NAT");
    assert_eq!(next(&mut rx).await, None);
    assert!(bridge.registry().is_empty());
}
