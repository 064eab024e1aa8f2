//! Domain layer
//!
//! Pure data types shared by the query engine, the adapters and the bridge.
//! Nothing in here performs I/O.

pub mod container;
pub mod entry;
pub mod errors;
pub mod file_record;
pub mod query;

pub use container::{ContainerId, ContainerRoot};
pub use entry::RawEntry;
pub use errors::{ContainerError, DomainError};
pub use file_record::{DownloadStatus, FileRecord};
pub use query::{QueryPredicate, SearchScope};
