//! RAII handle for an active watch

/// Handle that halts an external watch exactly once
///
/// Stopping is idempotent: the stop callback runs on the first
/// [`stop`](Self::stop) or on drop, whichever comes first.
pub struct WatchHandle {
    stop_fn: Option<Box<dyn FnOnce() + Send>>,
}

impl WatchHandle {
    /// Creates a new WatchHandle with the given stop callback
    pub fn new(stop_fn: impl FnOnce() + Send + 'static) -> Self {
        Self {
            stop_fn: Some(Box::new(stop_fn)),
        }
    }

    /// A handle with nothing to stop
    #[must_use]
    pub fn noop() -> Self {
        Self { stop_fn: None }
    }

    /// Halts the watch; later calls do nothing
    pub fn stop(&mut self) {
        if let Some(stop_fn) = self.stop_fn.take() {
            stop_fn();
        }
    }

    /// Returns true until the watch has been halted
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.stop_fn.is_some()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("active", &self.is_active())
            .finish()
    }
}
