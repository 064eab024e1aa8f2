//! In-process metadata index
//!
//! [`MemoryIndex`] keeps a table of [`RawEntry`] values and notifies live
//! queries whenever an entry they include changes. It is what the bridge is
//! tested against, and it lets an embedding application drive transfer
//! state (percentages, download status, errors) from its own sync logic.
//!
//! Every notification carries the full result set, so a query that falls
//! behind only needs the newest one. When a query's channel is full, the
//! notification waits in a single-slot mailbox drained by a forwarding task;
//! a newer snapshot replaces the waiting one, and a waiting
//! `FinishedGathering` keeps its kind with the newer results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use ubiq_core::domain::RawEntry;
use ubiq_core::ports::{
    IMetadataIndex, IndexNotification, IndexRegistration, QuerySpec, WatchHandle,
};

use crate::sync::lock;

/// Default capacity of each query's notification channel
const DEFAULT_BUFFER: usize = 64;

/// Delivery path of one query
struct Mailbox {
    tx: mpsc::Sender<IndexNotification>,
    pending: Mutex<Option<IndexNotification>>,
    ready: Notify,
    stop: CancellationToken,
}

impl Mailbox {
    fn new(tx: mpsc::Sender<IndexNotification>) -> Self {
        Self {
            tx,
            pending: Mutex::new(None),
            ready: Notify::new(),
            stop: CancellationToken::new(),
        }
    }

    fn post(&self, notification: IndexNotification) {
        let mut pending = lock(&self.pending);
        let next = match (pending.take(), notification) {
            (None, next) => match self.tx.try_send(next) {
                Ok(()) => return,
                Err(TrySendError::Closed(_)) => return,
                Err(TrySendError::Full(next)) => next,
            },
            (Some(IndexNotification::FinishedGathering(_)), IndexNotification::Updated(results)) => {
                IndexNotification::FinishedGathering(results)
            }
            (Some(_), next) => {
                trace!("Replacing undelivered snapshot");
                next
            }
        };
        *pending = Some(next);
        drop(pending);
        self.ready.notify_one();
    }

    fn close(&self) {
        self.stop.cancel();
        lock(&self.pending).take();
    }

    /// Moves waiting notifications into the channel as capacity frees up
    async fn forward(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = self.tx.closed() => break,
                _ = self.ready.notified() => {}
            }
            let permit = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                permit = self.tx.reserve() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            // Sent under the lock so direct sends from `post` cannot overtake it.
            {
                let mut pending = lock(&self.pending);
                if let Some(notification) = pending.take() {
                    permit.send(notification);
                }
            }
        }
    }
}

struct LiveQuery {
    id: u64,
    spec: QuerySpec,
    gathered: bool,
    mailbox: Arc<Mailbox>,
}

#[derive(Default)]
struct IndexState {
    entries: BTreeMap<PathBuf, RawEntry>,
    queries: Vec<LiveQuery>,
    next_id: u64,
    opened: usize,
    stopped: usize,
}

impl IndexState {
    fn snapshot(&self, spec: &QuerySpec) -> Vec<RawEntry> {
        self.entries
            .values()
            .filter(|e| spec.includes(&e.path))
            .cloned()
            .collect()
    }
}

/// Metadata index held entirely in memory
pub struct MemoryIndex {
    state: Arc<Mutex<IndexState>>,
    auto_gather: bool,
    buffer: usize,
}

impl MemoryIndex {
    /// Index whose queries finish gathering as soon as they open
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(IndexState::default())),
            auto_gather: true,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Index whose queries stay in the gathering phase until
    /// [`finish_gathering`](Self::finish_gathering) is called
    #[must_use]
    pub fn manual() -> Self {
        Self {
            auto_gather: false,
            ..Self::new()
        }
    }

    /// Sets the notification channel capacity for queries opened later
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Inserts or replaces an entry and notifies every gathered query that includes it
    pub fn upsert(&self, entry: RawEntry) {
        let mut state = lock(&self.state);
        let path = entry.path.clone();
        state.entries.insert(path.clone(), entry);
        Self::notify_changed(&state, &path);
    }

    /// Applies `f` to an existing entry; returns false if there is none
    pub fn update(&self, path: &Path, f: impl FnOnce(&mut RawEntry)) -> bool {
        let mut state = lock(&self.state);
        let Some(entry) = state.entries.get_mut(path) else {
            return false;
        };
        f(entry);
        Self::notify_changed(&state, path);
        true
    }

    /// Removes an entry and notifies the queries that included it
    pub fn remove(&self, path: &Path) -> Option<RawEntry> {
        let mut state = lock(&self.state);
        let removed = state.entries.remove(path);
        if removed.is_some() {
            Self::notify_changed(&state, path);
        }
        removed
    }

    /// Current entry at `path`, if any
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<RawEntry> {
        lock(&self.state).entries.get(path).cloned()
    }

    /// Sends the gather-complete notification to every query still gathering
    pub fn finish_gathering(&self) {
        let mut state = lock(&self.state);
        let snapshots: Vec<_> = state
            .queries
            .iter()
            .filter(|q| !q.gathered)
            .map(|q| (q.id, state.snapshot(&q.spec)))
            .collect();
        for (id, snapshot) in snapshots {
            if let Some(query) = state.queries.iter_mut().find(|q| q.id == id) {
                query.gathered = true;
                query.mailbox.post(IndexNotification::FinishedGathering(snapshot));
            }
        }
    }

    /// Number of queries ever opened
    #[must_use]
    pub fn open_count(&self) -> usize {
        lock(&self.state).opened
    }

    /// Number of queries halted through their watch handle
    #[must_use]
    pub fn stop_count(&self) -> usize {
        lock(&self.state).stopped
    }

    /// Number of queries currently open
    #[must_use]
    pub fn live_query_count(&self) -> usize {
        lock(&self.state).queries.len()
    }

    fn notify_changed(state: &IndexState, path: &Path) {
        // Queries still gathering pick the change up from their gather snapshot.
        for query in state
            .queries
            .iter()
            .filter(|q| q.gathered && q.spec.includes(path))
        {
            let snapshot = state.snapshot(&query.spec);
            debug!(query = query.id, path = %path.display(), results = snapshot.len(), "Index update");
            query.mailbox.post(IndexNotification::Updated(snapshot));
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl IMetadataIndex for MemoryIndex {
    async fn open(&self, spec: QuerySpec) -> anyhow::Result<IndexRegistration> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mailbox = Arc::new(Mailbox::new(tx));
        tokio::spawn(Arc::clone(&mailbox).forward());

        let mut state = lock(&self.state);
        state.next_id += 1;
        state.opened += 1;
        let id = state.next_id;

        let query = LiveQuery {
            id,
            gathered: self.auto_gather,
            spec,
            mailbox: Arc::clone(&mailbox),
        };
        if self.auto_gather {
            mailbox.post(IndexNotification::FinishedGathering(state.snapshot(&query.spec)));
        }
        state.queries.push(query);
        debug!(query = id, "Memory query opened");

        let shared = Arc::clone(&self.state);
        let handle = WatchHandle::new(move || {
            mailbox.close();
            let mut state = lock(&shared);
            state.queries.retain(|q| q.id != id);
            state.stopped += 1;
            debug!(query = id, "Memory query stopped");
        });

        Ok(IndexRegistration {
            notifications: rx,
            handle,
        })
    }
}
