//! Error types for bridge operations.
//!
//! Defines `BridgeError` and its mapping to the stable wire codes a remote
//! caller receives.

use std::path::PathBuf;

use thiserror::Error;
use ubiq_core::domain::{ContainerError, DomainError};

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors returned by [`CloudBridge`](crate::CloudBridge) operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Malformed or missing call inputs, rejected before any side effect
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Container could not be resolved, rejected before any side effect
    #[error("container unavailable: {0}")]
    Container(ContainerError),

    /// Delete target does not exist
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Backing store or query failure, carrying the underlying diagnostic
    #[error("native error: {0}")]
    Native(String),
}

impl BridgeError {
    /// Stable code surfaced to remote callers
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidArguments(_) => "E_ARG",
            BridgeError::Container(_) => "E_CTR",
            BridgeError::FileNotFound(_) => "E_FNF",
            BridgeError::Native(_) => "E_NAT",
        }
    }

    /// Wraps an adapter failure, keeping its full context chain
    pub fn native(err: &anyhow::Error) -> Self {
        BridgeError::Native(format!("{err:#}"))
    }
}

impl From<ContainerError> for BridgeError {
    fn from(err: ContainerError) -> Self {
        match err {
            // A malformed id is the caller's fault, not the container's.
            ContainerError::Invalid(domain) => domain.into(),
            other => BridgeError::Container(other),
        }
    }
}

impl From<DomainError> for BridgeError {
    fn from(err: DomainError) -> Self {
        BridgeError::InvalidArguments(err.to_string())
    }
}
