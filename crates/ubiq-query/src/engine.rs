//! Metadata query engine
//!
//! Turns the notification stream of an [`IMetadataIndex`] query into calls
//! on a [`QueryObserver`], with an explicit subscription lifecycle:
//!
//! ```text
//!  Idle ──open()──► Gathering ──FinishedGathering──► Active ──stop()──► Stopped
//!    │                  │                                                  ▲
//!    └──────────────────┴───────────────────stop()─────────────────────────┘
//! ```
//!
//! Each subscription gets its own delivery task, so callbacks for one
//! subscription never overlap while separate subscriptions interleave freely.
//! Observers that do blocking work do not hold up anyone else's delivery.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use ubiq_core::domain::{DomainError, QueryPredicate, RawEntry};
use ubiq_core::ports::{IMetadataIndex, IndexNotification, QuerySpec, WatchHandle};

use crate::sync::lock;

// ============================================================================
// SubscriptionState
// ============================================================================

/// Lifecycle state of a query subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Created, index query not opened yet
    Idle,
    /// Waiting for the initial gather to finish
    Gathering,
    /// Initial snapshot delivered; receiving updates
    Active,
    /// Stopped; no callback will start from now on
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionState::Idle => write!(f, "idle"),
            SubscriptionState::Gathering => write!(f, "gathering"),
            SubscriptionState::Active => write!(f, "active"),
            SubscriptionState::Stopped => write!(f, "stopped"),
        }
    }
}

impl SubscriptionState {
    /// Validates a lifecycle transition
    pub fn transition(self, to: SubscriptionState) -> Result<SubscriptionState, DomainError> {
        use SubscriptionState::*;
        match (self, to) {
            (Idle, Gathering) | (Gathering, Active) => Ok(to),
            (from, Stopped) if from != Stopped => Ok(to),
            (from, to) => Err(DomainError::InvalidState {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

// ============================================================================
// QueryObserver
// ============================================================================

/// Receiver of query snapshots
///
/// Both methods get the full current result set. For exact-path queries the
/// engine never calls either method with an empty set, and only the first
/// result is meaningful: exact predicates are assumed to match one item.
///
/// Observers may call [`SubscriptionHandle::stop`] from inside a callback.
#[async_trait::async_trait]
pub trait QueryObserver: Send + Sync {
    /// Called once, when the initial gather finishes
    async fn on_gathered(&self, subscription: &SubscriptionHandle, results: &[RawEntry]);

    /// Called for every change after gathering
    async fn on_updated(&self, subscription: &SubscriptionHandle, results: &[RawEntry]);

    /// Called once if the index ends the query on its own
    ///
    /// The subscription is already stopped when this runs. Not called after
    /// an explicit [`SubscriptionHandle::stop`].
    async fn on_index_closed(&self, _subscription: &SubscriptionHandle) {}
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

struct SubscriptionInner {
    id: u64,
    predicate: QueryPredicate,
    state: Mutex<SubscriptionState>,
    observer: Mutex<Option<Arc<dyn QueryObserver>>>,
    index_handle: Mutex<Option<WatchHandle>>,
    cancel: CancellationToken,
}

/// Shared handle to a live query subscription
///
/// Cloning is cheap; every clone controls the same subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    inner: Arc<SubscriptionInner>,
}

impl SubscriptionHandle {
    fn new(id: u64, predicate: QueryPredicate, observer: Arc<dyn QueryObserver>) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                id,
                predicate,
                state: Mutex::new(SubscriptionState::Idle),
                observer: Mutex::new(Some(observer)),
                index_handle: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Engine-unique subscription id
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *lock(&self.inner.state)
    }

    /// True while gathering or active
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(
            self.state(),
            SubscriptionState::Gathering | SubscriptionState::Active
        )
    }

    /// Stops the subscription
    ///
    /// Unregisters the observer, then halts the index query. Safe to call any
    /// number of times and from inside an observer callback; calls after the
    /// first are no-ops. A callback that is already running finishes, but no
    /// new callback starts once this returns.
    pub fn stop(&self) {
        self.halt();
    }

    /// Stops the subscription; returns the observer if this call did it
    fn halt(&self) -> Option<Arc<dyn QueryObserver>> {
        {
            let mut state = lock(&self.inner.state);
            if *state == SubscriptionState::Stopped {
                trace!(subscription = self.inner.id, "stop on stopped subscription");
                return None;
            }
            *state = SubscriptionState::Stopped;
        }

        let observer = lock(&self.inner.observer).take();
        self.inner.cancel.cancel();
        if let Some(mut handle) = lock(&self.inner.index_handle).take() {
            handle.stop();
        }

        debug!(
            subscription = self.inner.id,
            predicate = %self.inner.predicate,
            "Subscription stopped"
        );
        observer
    }

    fn advance(&self, to: SubscriptionState) -> bool {
        let mut state = lock(&self.inner.state);
        match state.transition(to) {
            Ok(next) => {
                *state = next;
                true
            }
            Err(e) => {
                trace!(subscription = self.inner.id, error = %e, "transition refused");
                false
            }
        }
    }

    async fn deliver(&self, notification: IndexNotification) {
        let exact = self.inner.predicate.is_exact();

        let gathered = match &notification {
            IndexNotification::FinishedGathering(_) => {
                if !self.advance(SubscriptionState::Active) {
                    return;
                }
                true
            }
            IndexNotification::Updated(_) => {
                if self.state() != SubscriptionState::Active {
                    trace!(subscription = self.inner.id, "update before gathering finished, ignored");
                    return;
                }
                false
            }
        };

        let results = notification.results();
        if exact && results.is_empty() {
            // No evidence about the tracked item yet; wait for the next update.
            trace!(subscription = self.inner.id, "exact query has no result yet");
            return;
        }

        let Some(observer) = lock(&self.inner.observer).clone() else {
            return;
        };

        trace!(
            subscription = self.inner.id,
            gathered,
            results = results.len(),
            "Delivering query snapshot"
        );
        if gathered {
            observer.on_gathered(self, results).await;
        } else {
            observer.on_updated(self, results).await;
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.inner.id)
            .field("predicate", &self.inner.predicate)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// QueryEngine
// ============================================================================

/// Starts live queries against a metadata index
pub struct QueryEngine {
    index: Arc<dyn IMetadataIndex>,
    next_id: AtomicU64,
}

impl QueryEngine {
    /// Creates an engine over the given index
    pub fn new(index: Arc<dyn IMetadataIndex>) -> Self {
        Self {
            index,
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts watching `spec`, reporting snapshots to `observer`
    ///
    /// Returns as soon as the index query is open; the initial snapshot
    /// arrives asynchronously through [`QueryObserver::on_gathered`].
    ///
    /// # Errors
    /// Returns an error if the index refuses to open the query.
    pub async fn watch(
        &self,
        spec: QuerySpec,
        observer: Arc<dyn QueryObserver>,
    ) -> Result<SubscriptionHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriptionHandle::new(id, spec.predicate.clone(), observer);

        info!(subscription = id, predicate = %spec.predicate, scopes = ?spec.scopes, "Starting query");

        let registration = self
            .index
            .open(spec)
            .await
            .with_context(|| format!("Failed to start metadata query {id}"))?;

        *lock(&handle.inner.index_handle) = Some(registration.handle);
        if !handle.advance(SubscriptionState::Gathering) {
            warn!(subscription = id, "Subscription stopped while opening");
            return Ok(handle);
        }

        let task_handle = handle.clone();
        let mut notifications = registration.notifications;
        tokio::spawn(async move {
            let cancel = task_handle.inner.cancel.clone();
            loop {
                let notification = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = notifications.recv() => match next {
                        Some(n) => n,
                        None => {
                            debug!(subscription = task_handle.id(), "Index closed notification stream");
                            if let Some(observer) = task_handle.halt() {
                                observer.on_index_closed(&task_handle).await;
                            }
                            break;
                        }
                    },
                };
                task_handle.deliver(notification).await;
            }
            trace!(subscription = task_handle.id(), "Delivery task finished");
        });

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use tokio::sync::mpsc;
    use ubiq_core::domain::{ContainerRoot, SearchScope};
    use ubiq_core::ports::IndexRegistration;

    use super::*;
    use crate::memory::MemoryIndex;

    /// Observer that forwards every callback to a channel
    struct Recorder {
        tx: mpsc::UnboundedSender<(&'static str, usize)>,
        stop_on_gather: bool,
    }

    #[async_trait::async_trait]
    impl QueryObserver for Recorder {
        async fn on_gathered(&self, subscription: &SubscriptionHandle, results: &[RawEntry]) {
            let _ = self.tx.send(("gathered", results.len()));
            if self.stop_on_gather {
                subscription.stop();
            }
        }

        async fn on_updated(&self, _subscription: &SubscriptionHandle, results: &[RawEntry]) {
            let _ = self.tx.send(("updated", results.len()));
        }

        async fn on_index_closed(&self, _subscription: &SubscriptionHandle) {
            let _ = self.tx.send(("closed", 0));
        }
    }

    /// Index that reports one gathered item and then ends the stream
    struct ClosingIndex;

    #[async_trait::async_trait]
    impl IMetadataIndex for ClosingIndex {
        async fn open(&self, _spec: QuerySpec) -> Result<IndexRegistration> {
            let (tx, rx) = mpsc::channel(1);
            let _ = tx
                .send(IndexNotification::FinishedGathering(vec![RawEntry::new("/c/app/a.txt")]))
                .await;
            Ok(IndexRegistration {
                notifications: rx,
                handle: WatchHandle::new(|| {}),
            })
        }
    }

    fn recorder(stop_on_gather: bool) -> (Arc<Recorder>, mpsc::UnboundedReceiver<(&'static str, usize)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder { tx, stop_on_gather }), rx)
    }

    fn root() -> ContainerRoot {
        ContainerRoot::new("/c/app").unwrap()
    }

    fn prefix_spec() -> QuerySpec {
        QuerySpec {
            root: root(),
            predicate: QueryPredicate::under(&root()),
            scopes: SearchScope::ALL.to_vec(),
        }
    }

    fn exact_spec(path: &str) -> QuerySpec {
        QuerySpec {
            root: root(),
            predicate: QueryPredicate::ExactPath(PathBuf::from(path)),
            scopes: SearchScope::ALL.to_vec(),
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<(&'static str, usize)>) -> (&'static str, usize) {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for callback")
            .expect("observer dropped")
    }

    #[test]
    fn test_state_transitions() {
        use SubscriptionState::*;
        assert_eq!(Idle.transition(Gathering).unwrap(), Gathering);
        assert_eq!(Gathering.transition(Active).unwrap(), Active);
        assert_eq!(Active.transition(Stopped).unwrap(), Stopped);
        assert_eq!(Idle.transition(Stopped).unwrap(), Stopped);
        assert!(Active.transition(Gathering).is_err());
        assert!(Stopped.transition(Active).is_err());
        assert!(Stopped.transition(Stopped).is_err());
    }

    #[tokio::test]
    async fn test_gather_then_updates() {
        let index = Arc::new(MemoryIndex::new());
        index.upsert(RawEntry::new("/c/app/a.txt"));
        let engine = QueryEngine::new(index.clone());
        let (observer, mut rx) = recorder(false);

        let sub = engine.watch(prefix_spec(), observer).await.unwrap();
        assert_eq!(next(&mut rx).await, ("gathered", 1));
        assert_eq!(sub.state(), SubscriptionState::Active);

        index.upsert(RawEntry::new("/c/app/b.txt"));
        assert_eq!(next(&mut rx).await, ("updated", 2));

        sub.stop();
        assert_eq!(sub.state(), SubscriptionState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let index = Arc::new(MemoryIndex::new());
        let engine = QueryEngine::new(index.clone());
        let (observer, _rx) = recorder(false);

        let sub = engine.watch(prefix_spec(), observer).await.unwrap();
        sub.stop();
        sub.clone().stop();
        sub.stop();

        assert_eq!(index.open_count(), 1);
        assert_eq!(index.stop_count(), 1);
        assert_eq!(index.live_query_count(), 0);
    }

    #[tokio::test]
    async fn test_no_callbacks_after_stop() {
        let index = Arc::new(MemoryIndex::new());
        let engine = QueryEngine::new(index.clone());
        let (observer, mut rx) = recorder(true);

        let _sub = engine.watch(prefix_spec(), observer).await.unwrap();
        assert_eq!(next(&mut rx).await, ("gathered", 0));

        index.upsert(RawEntry::new("/c/app/late.txt"));
        let late = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))), "callback after stop: {late:?}");
        assert_eq!(index.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_exact_query_waits_for_evidence() {
        let index = Arc::new(MemoryIndex::new());
        let engine = QueryEngine::new(index.clone());
        let (observer, mut rx) = recorder(false);

        let sub = engine
            .watch(exact_spec("/c/app/up.bin"), observer)
            .await
            .unwrap();

        // Empty gather: no callback, but the subscription is active.
        index.upsert(RawEntry::new("/c/app/other.bin"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(sub.state(), SubscriptionState::Active);

        index.upsert(RawEntry::new("/c/app/up.bin"));
        assert_eq!(next(&mut rx).await, ("updated", 1));
        sub.stop();
    }

    #[tokio::test]
    async fn test_updates_before_gathering_are_ignored() {
        let index = Arc::new(MemoryIndex::manual());
        let engine = QueryEngine::new(index.clone());
        let (observer, mut rx) = recorder(false);

        let sub = engine.watch(prefix_spec(), observer).await.unwrap();
        assert_eq!(sub.state(), SubscriptionState::Gathering);

        index.upsert(RawEntry::new("/c/app/a.txt"));
        index.finish_gathering();
        assert_eq!(next(&mut rx).await, ("gathered", 1));
        assert!(rx.try_recv().is_err());
        sub.stop();
    }

    #[tokio::test]
    async fn test_closed_stream_notifies_observer_once() {
        let engine = QueryEngine::new(Arc::new(ClosingIndex));
        let (observer, mut rx) = recorder(false);

        let sub = engine.watch(prefix_spec(), observer).await.unwrap();
        assert_eq!(next(&mut rx).await, ("gathered", 1));
        assert_eq!(next(&mut rx).await, ("closed", 0));
        assert_eq!(sub.state(), SubscriptionState::Stopped);

        sub.stop();
        let late = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(late, Ok(Some(_))), "callback after close: {late:?}");
    }

    #[tokio::test]
    async fn test_gathering_completes_through_small_buffer() {
        let index = Arc::new(MemoryIndex::manual().with_buffer(1));
        let engine = QueryEngine::new(index.clone());
        let (observer, mut rx) = recorder(false);

        let sub = engine.watch(prefix_spec(), observer).await.unwrap();
        for name in ["a", "b", "c", "d"] {
            index.upsert(RawEntry::new(format!("/c/app/{name}.txt")));
        }
        index.finish_gathering();

        assert_eq!(next(&mut rx).await, ("gathered", 4));
        assert_eq!(sub.state(), SubscriptionState::Active);
        sub.stop();
    }
}
