//! UbiqBridge Query - live metadata queries
//!
//! Provides:
//! - [`engine`] - Subscriptions over an [`IMetadataIndex`](ubiq_core::ports::IMetadataIndex)
//!   with an explicit lifecycle and idempotent stop
//! - [`mapper`] - Raw index entries to [`FileRecord`](ubiq_core::domain::FileRecord)
//! - [`memory`] - An in-process index

pub mod engine;
pub mod mapper;
pub mod memory;
mod sync;

pub use engine::{QueryEngine, QueryObserver, SubscriptionHandle, SubscriptionState};
pub use mapper::{map_entries, map_entry};
pub use memory::MemoryIndex;
