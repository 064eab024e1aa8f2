//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the bridge depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IContainerResolver`] - Maps a container id to its root location
//! - [`IMetadataIndex`] - The external indexing facility behind live queries
//! - [`ICloudStore`] - File-system mutations inside a container

pub mod cloud_store;
pub mod container_resolver;
pub mod metadata_index;
pub mod watch_handle;

pub use cloud_store::ICloudStore;
pub use container_resolver::IContainerResolver;
pub use metadata_index::{IMetadataIndex, IndexNotification, IndexRegistration, QuerySpec};
pub use watch_handle::WatchHandle;
