//! Local cloud store adapter (secondary/driven adapter)
//!
//! Implements [`ICloudStore`] using `tokio::fs`.
//!
//! ## Design Decisions
//!
//! - **No implicit overwrite**: `copy_item` and `move_item` fail when the
//!   destination exists. Overwrite semantics belong to the caller, which
//!   removes the destination first.
//! - **Directories**: copies recurse on a blocking thread; removals use
//!   `remove_dir_all`.
//! - **Materialization**: local items are always resident, so
//!   `start_downloading` only checks that the item exists.

use std::io::{self, ErrorKind};
use std::path::Path;

use anyhow::{bail, Context};
use tracing::{debug, instrument};
use ubiq_core::ports::ICloudStore;

/// Adapter that bridges the [`ICloudStore`] port to the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalCloudStore;

impl LocalCloudStore {
    /// Create a new `LocalCloudStore`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(from)?;
    if meta.is_dir() {
        std::fs::create_dir(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        std::fs::copy(from, to)?;
    }
    Ok(())
}

async fn ensure_absent(path: &Path) -> anyhow::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => bail!("destination already exists: {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("cannot stat {}", path.display())),
    }
}

#[async_trait::async_trait]
impl ICloudStore for LocalCloudStore {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn exists(&self, path: &Path) -> anyhow::Result<bool> {
        match tokio::fs::symlink_metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("cannot stat {}", path.display())),
        }
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_item(&self, path: &Path) -> anyhow::Result<()> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .with_context(|| format!("cannot stat {}", path.display()))?;

        if metadata.is_dir() {
            debug!("removing directory recursively");
            tokio::fs::remove_dir_all(path).await?;
        } else {
            debug!("removing file");
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_dir_all(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("cannot create directory {}", path.display()))
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn copy_item(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        ensure_absent(to).await?;
        let (src, dst) = (from.to_path_buf(), to.to_path_buf());
        tokio::task::spawn_blocking(move || copy_recursive(&src, &dst))
            .await?
            .with_context(|| format!("cannot copy {} to {}", from.display(), to.display()))?;
        debug!("copy complete");
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn move_item(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        ensure_absent(to).await?;
        tokio::fs::rename(from, to)
            .await
            .with_context(|| format!("cannot move {} to {}", from.display(), to.display()))?;
        debug!("move complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn start_downloading(&self, path: &Path) -> anyhow::Result<()> {
        if !self.exists(path).await? {
            bail!("no such item: {}", path.display());
        }
        debug!("item already resident");
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================
