//! Cloud store port (driven/secondary port)
//!
//! File-system mutations performed inside a resolved container. The sync
//! daemon that moves bytes to and from the cloud is outside this system; the
//! store only touches the local side and asks the daemon to materialize items.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because failures are adapter-specific; the bridge
//!   surfaces them verbatim as native errors.
//! - All paths are absolute.

use std::path::Path;

/// Port trait for file-system mutations within a container
#[async_trait::async_trait]
pub trait ICloudStore: Send + Sync {
    /// Returns true if something exists at `path`
    async fn exists(&self, path: &Path) -> anyhow::Result<bool>;

    /// Removes a file, or a directory recursively
    async fn remove_item(&self, path: &Path) -> anyhow::Result<()>;

    /// Creates a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()>;

    /// Copies a file; the destination must not exist
    async fn copy_item(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Moves a file or directory; the destination must not exist
    async fn move_item(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Asks the sync daemon to start materializing a cloud item locally
    ///
    /// Returns once the request is accepted, not when the bytes arrive.
    async fn start_downloading(&self, path: &Path) -> anyhow::Result<()>;
}
