//! Container resolution for the local directory store

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;
use ubiq_core::domain::{ContainerError, ContainerId, ContainerRoot};
use ubiq_core::ports::IContainerResolver;

/// Resolves container ids to `<base>/<id>` directories
///
/// The directory is checked on every call; deleting it or making it
/// unreadable is observed by the next resolution.
#[derive(Debug)]
pub struct DirectoryContainerResolver {
    base: PathBuf,
    signed_in: AtomicBool,
}

impl DirectoryContainerResolver {
    /// Create a resolver rooted at `base`
    pub fn new(base: impl Into<PathBuf>, signed_in: bool) -> Self {
        Self {
            base: base.into(),
            signed_in: AtomicBool::new(signed_in),
        }
    }

    /// Simulates signing in or out of the account
    pub fn set_signed_in(&self, signed_in: bool) {
        self.signed_in.store(signed_in, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl IContainerResolver for DirectoryContainerResolver {
    async fn resolve(&self, id: &ContainerId) -> Result<ContainerRoot, ContainerError> {
        if !self.signed_in.load(Ordering::SeqCst) {
            return Err(ContainerError::NotSignedIn);
        }

        let dir = self.base.join(id.as_str());
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ContainerError::UnknownContainer(id.to_string())),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                return Err(ContainerError::PermissionRevoked(id.to_string()))
            }
            Err(_) => return Err(ContainerError::UnknownContainer(id.to_string())),
        }
        if let Err(e) = tokio::fs::read_dir(&dir).await {
            if e.kind() == ErrorKind::PermissionDenied {
                return Err(ContainerError::PermissionRevoked(id.to_string()));
            }
        }

        debug!(container = %id, root = %dir.display(), "Resolved container");
        Ok(ContainerRoot::new(dir)?)
    }
}
