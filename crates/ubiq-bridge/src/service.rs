//! The bridge service
//!
//! [`CloudBridge`] exposes the remote-callable operations. Every operation
//! resolves its container afresh, validates its arguments before touching
//! anything, and reports failures as [`BridgeError`]. Streaming operations
//! return as soon as their subscription is running; everything after that
//! arrives on the named event channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use ubiq_core::domain::{ContainerId, ContainerRoot, FileRecord, QueryPredicate, SearchScope};
use ubiq_core::ports::{ICloudStore, IContainerResolver, IMetadataIndex, QuerySpec};
use ubiq_query::{QueryEngine, QueryObserver};

use crate::coordinator::FileCoordinator;
use crate::error::{BridgeError, Result};
use crate::registry::{ChannelError, ChannelEvent, EventChannel, EventStreamRegistry};
use crate::transfer::{
    replace_with_copy, CancelSlot, DownloadObserver, GatherObserver, TransferStream,
    UploadObserver,
};

/// A channel claimed by one operation, with the slot its cancel handler stops
struct Claim {
    channel: Arc<EventChannel>,
    slot: CancelSlot,
}

/// Bridge between remote callers and the cloud store
pub struct CloudBridge {
    resolver: Arc<dyn IContainerResolver>,
    store: Arc<dyn ICloudStore>,
    engine: QueryEngine,
    registry: Arc<EventStreamRegistry>,
    coordinator: Arc<FileCoordinator>,
    scopes: Vec<SearchScope>,
}

impl CloudBridge {
    /// Creates a bridge searching every scope
    pub fn new(
        resolver: Arc<dyn IContainerResolver>,
        store: Arc<dyn ICloudStore>,
        index: Arc<dyn IMetadataIndex>,
    ) -> Self {
        Self {
            resolver,
            store,
            engine: QueryEngine::new(index),
            registry: Arc::new(EventStreamRegistry::new()),
            coordinator: Arc::new(FileCoordinator::new()),
            scopes: SearchScope::ALL.to_vec(),
        }
    }

    /// Restricts the scopes searched by every query
    ///
    /// An empty list keeps the current scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<SearchScope>) -> Self {
        if !scopes.is_empty() {
            self.scopes = scopes;
        }
        self
    }

    /// The channel registry of this bridge
    #[must_use]
    pub fn registry(&self) -> &Arc<EventStreamRegistry> {
        &self.registry
    }

    /// Registers a new event channel
    pub fn create_event_channel(&self, name: &str) -> Result<()> {
        self.registry.create(name)?;
        Ok(())
    }

    /// Remote detach of a channel: stops its operation and removes it
    pub fn cancel(&self, channel: &str) -> bool {
        let cancelled = self.registry.cancel(channel);
        if cancelled {
            info!(channel, "Channel cancelled by listener");
        }
        cancelled
    }

    // ------------------------------------------------------------------------
    // Streaming operations
    // ------------------------------------------------------------------------

    /// Lists every visible item of a container
    ///
    /// With a channel, the query stays live and each change is emitted as
    /// [`ChannelEvent::Files`] until the channel is cancelled.
    pub async fn gather(&self, container: &str, channel: Option<&str>) -> Result<Vec<FileRecord>> {
        let root = self.resolve(container).await?;
        let claim = self.claim(channel)?;

        let (tx, rx) = oneshot::channel();
        let stream = claim
            .as_ref()
            .map(|c| TransferStream::new(Some(Arc::clone(&c.channel)), Arc::clone(&self.registry)));
        let observer = GatherObserver::new(root.clone(), tx, stream);
        let predicate = QueryPredicate::under(&root);
        self.start(&root, predicate, Arc::new(observer), claim.as_ref())
            .await?;

        match rx.await {
            Ok(records) => {
                info!(container, files = records.len(), live = claim.is_some(), "Gathered container");
                Ok(records)
            }
            Err(_) => {
                self.release(claim.as_ref());
                Err(BridgeError::Native(
                    "query stopped before gathering completed".to_string(),
                ))
            }
        }
    }

    /// Copies a local file into the container, replacing any existing item
    ///
    /// Returns once the copy is done; with a channel, upload progress follows
    /// as events ending in [`ChannelEvent::EndOfStream`].
    pub async fn upload(
        &self,
        container: &str,
        local: &Path,
        cloud_name: &str,
        channel: Option<&str>,
    ) -> Result<()> {
        let root = self.resolve(container).await?;
        let destination = root.resolve(cloud_name)?;
        let claim = self.claim(channel)?;

        if let Err(e) =
            replace_with_copy(self.store.as_ref(), &self.coordinator, local, &destination).await
        {
            self.release(claim.as_ref());
            return Err(BridgeError::native(&e));
        }
        info!(container, path = %destination.display(), "Uploaded local file");

        if let Some(c) = &claim {
            let observer = UploadObserver::new(TransferStream::new(
                Some(Arc::clone(&c.channel)),
                Arc::clone(&self.registry),
            ));
            self.start(&root, QueryPredicate::ExactPath(destination), Arc::new(observer), Some(c))
                .await?;
        }
        Ok(())
    }

    /// Materializes a cloud item and copies it to `local` once current
    pub async fn download(
        &self,
        container: &str,
        cloud_name: &str,
        local: &Path,
        channel: Option<&str>,
    ) -> Result<()> {
        if local.as_os_str().is_empty() {
            return Err(BridgeError::InvalidArguments("local path is empty".to_string()));
        }
        self.download_to(container, cloud_name, Some(local.to_path_buf()), channel)
            .await
    }

    /// Materializes a cloud item where it is
    pub async fn download_in_place(
        &self,
        container: &str,
        cloud_name: &str,
        channel: Option<&str>,
    ) -> Result<()> {
        self.download_to(container, cloud_name, None, channel).await
    }

    async fn download_to(
        &self,
        container: &str,
        cloud_name: &str,
        destination: Option<PathBuf>,
        channel: Option<&str>,
    ) -> Result<()> {
        let root = self.resolve(container).await?;
        let source = root.resolve(cloud_name)?;
        let claim = self.claim(channel)?;

        if let Err(e) = self.store.start_downloading(&source).await {
            // The item may already be current; keep watching.
            let err = BridgeError::native(&e);
            warn!(container, path = %source.display(), error = %err, "Could not start download");
            if let Some(c) = &claim {
                c.channel.emit(ChannelEvent::from(&err));
            }
        }

        let stream = TransferStream::new(
            claim.as_ref().map(|c| Arc::clone(&c.channel)),
            Arc::clone(&self.registry),
        );
        let observer = DownloadObserver::new(
            stream,
            destination,
            Arc::clone(&self.store),
            Arc::clone(&self.coordinator),
        );
        self.start(&root, QueryPredicate::ExactPath(source.clone()), Arc::new(observer), claim.as_ref())
            .await?;
        info!(container, path = %source.display(), "Download started");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Coordinated mutations
    // ------------------------------------------------------------------------

    /// Deletes items in order, stopping at the first failure
    ///
    /// Items deleted before a failure stay deleted.
    #[instrument(skip(self, paths), fields(count = paths.len()))]
    pub async fn delete(&self, container: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Err(BridgeError::InvalidArguments("no paths to delete".to_string()));
        }
        let root = self.resolve(container).await?;
        let targets = paths
            .iter()
            .map(|p| root.resolve(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for target in &targets {
            let _guard = self.coordinator.coordinate_write(target).await;
            let exists = self
                .store
                .exists(target)
                .await
                .map_err(|e| BridgeError::native(&e))?;
            if !exists {
                debug!(path = %target.display(), "Delete target missing");
                return Err(BridgeError::FileNotFound(target.clone()));
            }
            self.store
                .remove_item(target)
                .await
                .map_err(|e| BridgeError::native(&e))?;
            debug!(path = %target.display(), "Deleted");
        }
        info!(container, count = targets.len(), "Delete complete");
        Ok(())
    }

    /// Moves an item within a container, creating the destination's parents
    #[instrument(skip(self))]
    pub async fn move_item(&self, container: &str, from: &str, to: &str) -> Result<()> {
        let root = self.resolve(container).await?;
        let from = root.resolve(from)?;
        let to = root.resolve(to)?;

        let _guards = self.coordinator.coordinate_pair(&from, &to).await;
        if let Some(parent) = to.parent() {
            let exists = self
                .store
                .exists(parent)
                .await
                .map_err(|e| BridgeError::native(&e))?;
            if !exists {
                self.store
                    .create_dir_all(parent)
                    .await
                    .map_err(|e| BridgeError::native(&e))?;
            }
        }
        self.store
            .move_item(&from, &to)
            .await
            .map_err(|e| BridgeError::native(&e))?;
        info!(container, from = %from.display(), to = %to.display(), "Moved");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn resolve(&self, container: &str) -> Result<ContainerRoot> {
        let id = ContainerId::new(container)?;
        let root = self.resolver.resolve(&id).await?;
        debug!(container, root = %root, "Container resolved");
        Ok(root)
    }

    /// Takes ownership of a registered channel for one operation
    ///
    /// An absent or empty name means the caller wants no events.
    fn claim(&self, name: Option<&str>) -> Result<Option<Claim>> {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let channel = self
            .registry
            .lookup(name)
            .ok_or_else(|| ChannelError::NotFound(name.to_string()))?;

        let slot = CancelSlot::default();
        let handler_slot = slot.clone();
        channel.on_cancel(move || handler_slot.stop())?;
        debug!(channel = name, "Channel claimed");
        Ok(Some(Claim { channel, slot }))
    }

    /// Closes a claimed channel whose operation ended before streaming
    fn release(&self, claim: Option<&Claim>) {
        if let Some(c) = claim {
            c.channel.finish();
            self.registry.remove_channel(&c.channel);
        }
    }

    /// Opens the query and wires it to the claimed channel's cancel handler
    async fn start(
        &self,
        root: &ContainerRoot,
        predicate: QueryPredicate,
        observer: Arc<dyn QueryObserver>,
        claim: Option<&Claim>,
    ) -> Result<()> {
        let spec = QuerySpec {
            root: root.clone(),
            predicate,
            scopes: self.scopes.clone(),
        };
        match self.engine.watch(spec, observer).await {
            Ok(subscription) => {
                if let Some(c) = claim {
                    c.slot.attach(&subscription);
                }
                Ok(())
            }
            Err(e) => {
                self.release(claim);
                Err(BridgeError::native(&e))
            }
        }
    }
}
