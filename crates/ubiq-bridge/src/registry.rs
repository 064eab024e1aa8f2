//! Event stream registry
//!
//! Named event channels, each carrying the progress of one logical
//! operation to at most one remote listener.
//!
//! ```text
//!  create("up1") ──► EventChannel ──listen()──► UnboundedReceiver<ChannelEvent>
//!                        │
//!        operation ──on_cancel(stop query)
//!        operation ──emit(Progress / Files / Error / EndOfStream)
//!        operation ──finish()             (normal termination)
//!  remote detach ──cancel("up1")          (runs the handler once, detaches)
//! ```
//!
//! A name maps to at most one channel; a channel is removed from the
//! registry when its operation finishes or is cancelled.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use ubiq_core::domain::FileRecord;

use crate::error::BridgeError;
use crate::sync::lock;

// ============================================================================
// ChannelEvent
// ============================================================================

/// One event delivered to a channel listener
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// Transfer percent complete, as reported by the index
    Progress(f64),
    /// Refreshed listing of a live gather
    Files(Vec<FileRecord>),
    /// Terminal failure of a streamed operation, or a non-terminal warning
    Error {
        code: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// The operation completed; nothing follows
    EndOfStream,
}

impl From<&BridgeError> for ChannelEvent {
    fn from(err: &BridgeError) -> Self {
        let details = match err {
            BridgeError::Native(diagnostic) => Some(diagnostic.clone()),
            _ => None,
        };
        ChannelEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

// ============================================================================
// ChannelError
// ============================================================================

/// Misuse of the registry or of a channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel name must not be empty")]
    EmptyName,

    #[error("channel '{0}' is already registered")]
    NameInUse(String),

    #[error("channel '{0}' is not registered")]
    NotFound(String),

    #[error("channel '{0}' already has a listener")]
    AlreadyListening(String),

    #[error("channel '{0}' is already owned by an operation")]
    Busy(String),

    #[error("channel '{0}' is closed")]
    Closed(String),
}

impl From<ChannelError> for BridgeError {
    fn from(err: ChannelError) -> Self {
        BridgeError::InvalidArguments(err.to_string())
    }
}

// ============================================================================
// EventChannel
// ============================================================================

type CancelHandler = Box<dyn FnOnce() + Send>;

/// A named event stream
pub struct EventChannel {
    name: String,
    sink: Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,
    cancel_handler: Mutex<Option<CancelHandler>>,
    owned: AtomicBool,
    closed: AtomicBool,
}

impl EventChannel {
    fn new(name: String) -> Self {
        Self {
            name,
            sink: Mutex::new(None),
            cancel_handler: Mutex::new(None),
            owned: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Channel name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once cancelled or finished
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True while a listener is attached
    #[must_use]
    pub fn has_listener(&self) -> bool {
        lock(&self.sink).as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Attaches the listener and returns its event stream
    ///
    /// A listener whose receiver was dropped counts as detached, so a new one
    /// may attach.
    pub fn listen(&self) -> Result<mpsc::UnboundedReceiver<ChannelEvent>, ChannelError> {
        let mut sink = lock(&self.sink);
        if self.is_closed() {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        if sink.as_ref().is_some_and(|tx| !tx.is_closed()) {
            return Err(ChannelError::AlreadyListening(self.name.clone()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *sink = Some(tx);
        debug!(channel = %self.name, "Listener attached");
        Ok(rx)
    }

    /// Sends an event to the listener; returns false if it went nowhere
    pub fn emit(&self, event: ChannelEvent) -> bool {
        // Closing happens under the sink lock, so nothing slips out after it.
        let sink = lock(&self.sink);
        if self.is_closed() {
            trace!(channel = %self.name, ?event, "Emit on closed channel dropped");
            return false;
        }
        match sink.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!(channel = %self.name, ?event, "No listener, event dropped");
                false
            }
        }
    }

    /// Claims the channel for one operation and registers its cancel handler
    ///
    /// # Errors
    /// [`ChannelError::Busy`] if another operation already owns the channel,
    /// [`ChannelError::Closed`] if it was cancelled or finished.
    pub fn on_cancel(&self, handler: impl FnOnce() + Send + 'static) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed(self.name.clone()));
        }
        if self.owned.swap(true, Ordering::AcqRel) {
            return Err(ChannelError::Busy(self.name.clone()));
        }
        *lock(&self.cancel_handler) = Some(Box::new(handler));
        Ok(())
    }

    /// Runs the cancel handler exactly once, then detaches the listener
    ///
    /// Returns false if the channel was already closed.
    pub fn cancel(&self) -> bool {
        if !self.close() {
            return false;
        }
        let handler = lock(&self.cancel_handler).take();
        if let Some(handler) = handler {
            handler();
        }
        debug!(channel = %self.name, "Channel cancelled");
        true
    }

    /// Closes the channel after normal termination without running the
    /// cancel handler
    ///
    /// Events already emitted stay readable; the receiver then ends.
    pub fn finish(&self) -> bool {
        if !self.close() {
            return false;
        }
        lock(&self.cancel_handler).take();
        debug!(channel = %self.name, "Channel finished");
        true
    }

    /// Marks the channel closed and detaches the listener in one step;
    /// false if it was already closed
    fn close(&self) -> bool {
        let mut sink = lock(&self.sink);
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        sink.take();
        true
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("owned", &self.owned.load(Ordering::Relaxed))
            .field("closed", &self.is_closed())
            .field("listening", &self.has_listener())
            .finish()
    }
}

// ============================================================================
// EventStreamRegistry
// ============================================================================

/// Table of live event channels, keyed by name
///
/// Each bridge instance owns its own registry.
#[derive(Debug, Default)]
pub struct EventStreamRegistry {
    channels: DashMap<String, Arc<EventChannel>>,
}

impl EventStreamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new channel
    ///
    /// A name left behind by a closed channel may be reused; a live one may not.
    pub fn create(&self, name: &str) -> Result<Arc<EventChannel>, ChannelError> {
        if name.is_empty() {
            return Err(ChannelError::EmptyName);
        }
        match self.channels.entry(name.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_closed() {
                    return Err(ChannelError::NameInUse(name.to_string()));
                }
                warn!(channel = name, "Replacing closed channel left in registry");
                let channel = Arc::new(EventChannel::new(name.to_string()));
                occupied.insert(Arc::clone(&channel));
                Ok(channel)
            }
            Entry::Vacant(vacant) => {
                let channel = Arc::new(EventChannel::new(name.to_string()));
                vacant.insert(Arc::clone(&channel));
                debug!(channel = name, "Channel created");
                Ok(channel)
            }
        }
    }

    /// Channel registered under `name`
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<EventChannel>> {
        self.channels.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Removes whatever channel is registered under `name`
    pub fn remove(&self, name: &str) -> Option<Arc<EventChannel>> {
        self.channels.remove(name).map(|(_, channel)| channel)
    }

    /// Removes `channel` only if it is still the one registered under its name
    pub fn remove_channel(&self, channel: &Arc<EventChannel>) -> bool {
        self.channels
            .remove_if(channel.name(), |_, current| Arc::ptr_eq(current, channel))
            .is_some()
    }

    /// Remote detach: cancels the channel and removes it
    ///
    /// Returns false if no channel is registered under `name`.
    pub fn cancel(&self, name: &str) -> bool {
        // Clone out first: the handler may touch the registry.
        let Some(channel) = self.lookup(name) else {
            return false;
        };
        channel.cancel();
        self.remove_channel(&channel);
        true
    }

    /// Number of registered channels
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Registered channel names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
