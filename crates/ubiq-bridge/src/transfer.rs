//! Transfer orchestration
//!
//! Query observers that turn the evolving metadata of one tracked item into
//! channel events:
//!
//! | Observer            | Error attribute     | Progress attribute   | Terminal condition             |
//! |---------------------|---------------------|----------------------|--------------------------------|
//! | [`UploadObserver`]   | `uploading_error`   | `percent_uploaded`   | percent ≥ 100                  |
//! | [`DownloadObserver`] | `downloading_error` | `percent_downloaded` | status `current` (+ local copy) |
//! | [`GatherObserver`]   | -                   | -                    | cancelled by the listener      |
//!
//! Every terminal path goes through [`TransferStream::close`], which stops the
//! subscription, closes the channel and removes it from the registry exactly
//! once.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};
use ubiq_core::domain::{ContainerRoot, DownloadStatus, FileRecord, RawEntry};
use ubiq_core::ports::ICloudStore;
use ubiq_query::{map_entries, QueryObserver, SubscriptionHandle};

use crate::coordinator::FileCoordinator;
use crate::error::BridgeError;
use crate::registry::{ChannelEvent, EventChannel, EventStreamRegistry};
use crate::sync::lock;

// ============================================================================
// Shared plumbing
// ============================================================================

/// Stops a subscription from a channel's cancel handler
///
/// The handler is registered before the subscription exists; a cancel that
/// lands in between is remembered and applied on [`attach`](Self::attach).
#[derive(Clone, Default)]
pub(crate) struct CancelSlot {
    inner: Arc<Mutex<(bool, Option<SubscriptionHandle>)>>,
}

impl CancelSlot {
    pub(crate) fn attach(&self, subscription: &SubscriptionHandle) {
        let mut slot = lock(&self.inner);
        if slot.0 {
            subscription.stop();
        } else {
            slot.1 = Some(subscription.clone());
        }
    }

    pub(crate) fn stop(&self) {
        let mut slot = lock(&self.inner);
        slot.0 = true;
        if let Some(subscription) = slot.1.take() {
            subscription.stop();
        }
    }
}

/// The channel side of one streamed operation
pub(crate) struct TransferStream {
    channel: Option<Arc<EventChannel>>,
    registry: Arc<EventStreamRegistry>,
    finished: AtomicBool,
}

impl TransferStream {
    pub(crate) fn new(channel: Option<Arc<EventChannel>>, registry: Arc<EventStreamRegistry>) -> Self {
        Self {
            channel,
            registry,
            finished: AtomicBool::new(false),
        }
    }

    fn name(&self) -> &str {
        self.channel.as_ref().map_or("-", |c| c.name())
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn emit(&self, event: ChannelEvent) {
        if let Some(channel) = &self.channel {
            channel.emit(event);
        }
    }

    /// Stops the query and tears the channel down; only the first call acts
    fn close(&self, subscription: &SubscriptionHandle) -> bool {
        if self.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        subscription.stop();
        if let Some(channel) = &self.channel {
            channel.finish();
            self.registry.remove_channel(channel);
        }
        true
    }

    fn fail(&self, subscription: &SubscriptionHandle, err: &BridgeError) {
        warn!(channel = self.name(), error = %err, "Transfer failed");
        self.emit(ChannelEvent::from(err));
        self.close(subscription);
    }

    /// Fails the stream when the index ended the query before a terminal state
    fn index_closed(&self, subscription: &SubscriptionHandle) {
        if self.is_finished() {
            return;
        }
        self.fail(
            subscription,
            &BridgeError::Native("metadata query ended before the operation finished".to_string()),
        );
    }
}

/// Replaces `to` with a copy of `from`, creating parent directories as needed
///
/// Not atomic: if the copy fails after the old destination was removed, the
/// destination stays absent.
pub(crate) async fn replace_with_copy(
    store: &dyn ICloudStore,
    coordinator: &FileCoordinator,
    from: &Path,
    to: &Path,
) -> anyhow::Result<()> {
    let _guard = coordinator.coordinate_write(to).await;
    if store.exists(to).await? {
        debug!(path = %to.display(), "Removing existing destination");
        store.remove_item(to).await?;
    } else if let Some(parent) = to.parent() {
        store.create_dir_all(parent).await?;
    }
    store
        .copy_item(from, to)
        .await
        .with_context(|| format!("cannot copy {} to {}", from.display(), to.display()))
}

// ============================================================================
// Upload
// ============================================================================

/// Reports upload progress of one cloud item
pub(crate) struct UploadObserver {
    stream: TransferStream,
    last_percent: Mutex<f64>,
}

impl UploadObserver {
    pub(crate) fn new(stream: TransferStream) -> Self {
        Self {
            stream,
            last_percent: Mutex::new(0.0),
        }
    }

    fn check(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        let Some(entry) = results.first() else {
            return;
        };
        if self.stream.is_finished() {
            return;
        }

        if let Some(err) = &entry.uploading_error {
            self.stream.fail(subscription, &BridgeError::Native(err.clone()));
            return;
        }

        let Some(percent) = entry.percent_uploaded else {
            trace!(channel = self.stream.name(), "No upload percent yet");
            return;
        };
        {
            let mut last = lock(&self.last_percent);
            if percent < *last {
                debug!(channel = self.stream.name(), percent, last = *last, "Suppressing regressed upload progress");
                return;
            }
            *last = percent;
        }
        self.stream.emit(ChannelEvent::Progress(percent));

        if percent >= 100.0 {
            self.stream.emit(ChannelEvent::EndOfStream);
            if self.stream.close(subscription) {
                info!(channel = self.stream.name(), path = %entry.path.display(), "Upload complete");
            }
        }
    }
}

#[async_trait::async_trait]
impl QueryObserver for UploadObserver {
    async fn on_gathered(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        self.check(subscription, results);
    }

    async fn on_updated(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        self.check(subscription, results);
    }

    async fn on_index_closed(&self, subscription: &SubscriptionHandle) {
        self.stream.index_closed(subscription);
    }
}

// ============================================================================
// Download
// ============================================================================

/// Reports materialization of one cloud item, optionally copying it out
pub(crate) struct DownloadObserver {
    stream: TransferStream,
    destination: Option<PathBuf>,
    store: Arc<dyn ICloudStore>,
    coordinator: Arc<FileCoordinator>,
}

impl DownloadObserver {
    /// `destination` is `None` for an in-place download
    pub(crate) fn new(
        stream: TransferStream,
        destination: Option<PathBuf>,
        store: Arc<dyn ICloudStore>,
        coordinator: Arc<FileCoordinator>,
    ) -> Self {
        Self {
            stream,
            destination,
            store,
            coordinator,
        }
    }

    async fn check(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        let Some(entry) = results.first() else {
            return;
        };
        if self.stream.is_finished() {
            return;
        }

        if let Some(err) = &entry.downloading_error {
            self.stream.fail(subscription, &BridgeError::Native(err.clone()));
            return;
        }

        if let Some(percent) = entry.percent_downloaded {
            self.stream.emit(ChannelEvent::Progress(percent));
        }

        if entry.download_status != Some(DownloadStatus::Current) {
            return;
        }

        if let Some(destination) = &self.destination {
            if let Err(e) =
                replace_with_copy(self.store.as_ref(), &self.coordinator, &entry.path, destination).await
            {
                self.stream.fail(subscription, &BridgeError::native(&e));
                return;
            }
        }

        self.stream.emit(ChannelEvent::EndOfStream);
        if self.stream.close(subscription) {
            info!(
                channel = self.stream.name(),
                path = %entry.path.display(),
                in_place = self.destination.is_none(),
                "Download complete"
            );
        }
    }
}

#[async_trait::async_trait]
impl QueryObserver for DownloadObserver {
    async fn on_gathered(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        self.check(subscription, results).await;
    }

    async fn on_updated(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        self.check(subscription, results).await;
    }

    async fn on_index_closed(&self, subscription: &SubscriptionHandle) {
        self.stream.index_closed(subscription);
    }
}

// ============================================================================
// Gather
// ============================================================================

/// Delivers the initial listing once, then optional live updates
pub(crate) struct GatherObserver {
    root: ContainerRoot,
    initial: Mutex<Option<oneshot::Sender<Vec<FileRecord>>>>,
    stream: Option<TransferStream>,
}

impl GatherObserver {
    pub(crate) fn new(
        root: ContainerRoot,
        initial: oneshot::Sender<Vec<FileRecord>>,
        stream: Option<TransferStream>,
    ) -> Self {
        Self {
            root,
            initial: Mutex::new(Some(initial)),
            stream,
        }
    }
}

#[async_trait::async_trait]
impl QueryObserver for GatherObserver {
    async fn on_gathered(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
        let records = map_entries(results, &self.root);
        debug!(root = %self.root, files = records.len(), "Gather complete");
        if let Some(tx) = lock(&self.initial).take() {
            let _ = tx.send(records);
        }
        if self.stream.is_none() {
            subscription.stop();
        }
    }

    async fn on_updated(&self, _subscription: &SubscriptionHandle, results: &[RawEntry]) {
        if let Some(stream) = &self.stream {
            let records = map_entries(results, &self.root);
            trace!(channel = stream.name(), files = records.len(), "Listing changed");
            stream.emit(ChannelEvent::Files(records));
        }
    }

    async fn on_index_closed(&self, subscription: &SubscriptionHandle) {
        // Before the first snapshot, dropping the sender fails the gather call itself.
        if lock(&self.initial).take().is_some() {
            return;
        }
        if let Some(stream) = &self.stream {
            stream.index_closed(subscription);
        }
    }
}
