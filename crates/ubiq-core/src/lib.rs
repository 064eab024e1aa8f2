//! UbiqBridge Core - Domain types and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `ContainerId`, `ContainerRoot`, `FileRecord`, `RawEntry`, `QueryPredicate`
//! - **Port definitions** - Traits for adapters: `IContainerResolver`, `IMetadataIndex`, `ICloudStore`
//! - **Configuration** - YAML-backed settings shared by every binary
//!
//! # Architecture
//!
//! The domain module has no knowledge of any concrete cloud provider.
//! Ports define trait interfaces that adapter crates implement, and the
//! bridge crate drives those ports to expose the remote-callable operations.

pub mod config;
pub mod domain;
pub mod ports;
