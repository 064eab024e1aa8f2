//! Container resolution port (driven/secondary port)

use crate::domain::{ContainerError, ContainerId, ContainerRoot};

/// Resolves container identifiers to root locations
///
/// Implementations perform a fresh check on every call: sign-out or a
/// revoked permission must be observed by the very next resolution.
/// No retries happen at this layer.
#[async_trait::async_trait]
pub trait IContainerResolver: Send + Sync {
    /// Returns the root location for `id`, or why it cannot be produced
    async fn resolve(&self, id: &ContainerId) -> Result<ContainerRoot, ContainerError>;
}
