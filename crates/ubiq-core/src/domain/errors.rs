//! Domain error types
//!
//! This module defines error types specific to domain operations:
//! validation failures on identifiers and paths, and container resolution
//! failures reported by an [`IContainerResolver`](crate::ports::IContainerResolver).

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid container identifier
    #[error("Invalid container id: {0}")]
    InvalidContainerId(String),

    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A relative cloud name that escapes or replaces the container root
    #[error("Invalid relative path: {0}")]
    InvalidRelativePath(String),

    /// Unknown search scope name
    #[error("Unknown search scope: {0}")]
    UnknownScope(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}

/// Reasons a container identifier cannot be resolved to a root location
///
/// Resolution is a point-in-time check; any of these may start or stop
/// applying between two calls.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// No account is signed in to the backing store
    #[error("user is not signed in")]
    NotSignedIn,

    /// The user revoked this application's access to the store
    #[error("permission to container {0} was revoked")]
    PermissionRevoked(String),

    /// The backing store has no container with this identifier
    #[error("unknown container: {0}")]
    UnknownContainer(String),

    /// The identifier itself is malformed
    #[error(transparent)]
    Invalid(#[from] DomainError),
}
