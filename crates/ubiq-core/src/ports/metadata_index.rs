//! Metadata index port (driven/secondary port)
//!
//! Wraps the external indexing facility. Opening a query yields a stream of
//! notifications: exactly one `FinishedGathering` once the initial scan is
//! done, then an `Updated` each time the result set changes, until the
//! returned [`WatchHandle`] is stopped.

use std::path::Path;

use tokio::sync::mpsc;

use super::watch_handle::WatchHandle;
use crate::domain::{ContainerRoot, QueryPredicate, RawEntry, SearchScope};

/// What to search and where
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Container the scopes are relative to
    pub root: ContainerRoot,
    /// Filter applied to indexed paths
    pub predicate: QueryPredicate,
    /// Scopes searched as a union
    pub scopes: Vec<SearchScope>,
}

impl QuerySpec {
    /// Returns true if an indexed path belongs in this query's results
    ///
    /// The path must satisfy the predicate and lie inside at least one scope.
    #[must_use]
    pub fn includes(&self, path: &Path) -> bool {
        self.predicate.matches(path)
            && self
                .scopes
                .iter()
                .any(|scope| path.starts_with(scope.root_in(&self.root)))
    }
}

/// One notification from a live query, carrying the full current result set
#[derive(Debug, Clone, PartialEq)]
pub enum IndexNotification {
    /// The initial gather finished
    FinishedGathering(Vec<RawEntry>),
    /// The result set changed after gathering
    Updated(Vec<RawEntry>),
}

impl IndexNotification {
    /// Result snapshot carried by this notification
    #[must_use]
    pub fn results(&self) -> &[RawEntry] {
        match self {
            IndexNotification::FinishedGathering(r) | IndexNotification::Updated(r) => r,
        }
    }
}

/// A started index query: its notification stream and the handle that halts it
///
/// Dropping the handle halts the query; the receiver then drains and closes.
#[derive(Debug)]
pub struct IndexRegistration {
    pub notifications: mpsc::Receiver<IndexNotification>,
    pub handle: WatchHandle,
}

/// Port trait for the external metadata index
#[async_trait::async_trait]
pub trait IMetadataIndex: Send + Sync {
    /// Starts a live query
    ///
    /// # Errors
    /// Returns an error if the index cannot start watching the requested scopes
    async fn open(&self, spec: QuerySpec) -> anyhow::Result<IndexRegistration>;
}
