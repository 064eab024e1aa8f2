//! UbiqBridge Local - adapters over a plain directory tree
//!
//! Each container is a sub-directory of a configured base directory. Files
//! are always fully materialized and uploaded, so transfers complete on the
//! first query snapshot. Useful for development and for hosts without a
//! cloud sync daemon.
//!
//! ## Modules
//!
//! - [`container`] - Container id to directory resolution
//! - [`filesystem`] - [`ICloudStore`](ubiq_core::ports::ICloudStore) over `tokio::fs`
//! - [`index`] - Directory scans plus `notify` watches as a metadata index

pub mod container;
pub mod filesystem;
pub mod index;

pub use container::DirectoryContainerResolver;
pub use filesystem::LocalCloudStore;
pub use index::LocalMetadataIndex;
