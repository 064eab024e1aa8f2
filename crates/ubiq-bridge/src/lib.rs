//! UbiqBridge - the bridging layer
//!
//! Exposes cloud container listing, transfers and coordinated mutations as a
//! fixed set of operations on [`CloudBridge`], with asynchronous progress
//! delivered over named event channels.
//!
//! ## Modules
//!
//! - [`registry`] - Named event channels and their registry
//! - [`coordinator`] - Per-path write coordination
//! - [`service`] - The operations
//! - [`error`] - Error taxonomy and wire codes

pub mod coordinator;
pub mod error;
pub mod registry;
pub mod service;
mod sync;
mod transfer;

pub use coordinator::FileCoordinator;
pub use error::{BridgeError, Result};
pub use registry::{ChannelError, ChannelEvent, EventChannel, EventStreamRegistry};
pub use service::CloudBridge;
