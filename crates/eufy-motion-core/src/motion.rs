//! Observable motion flag.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Motion flag shared between a session and its observers.
///
/// Cloning shares the same flag. Reads never block and always see the
/// latest write; writes are unconditional overwrites.
#[derive(Debug, Clone)]
pub struct MotionState {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for MotionState {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionState {
    /// Create a new flag, initially `false`.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> bool {
        *self.sender.borrow()
    }

    /// Overwrite the value, returning the previous one.
    pub fn set(&self, detected: bool) -> bool {
        self.sender.send_replace(detected)
    }

    /// Get a receiver for value changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Stream that yields the current value, then every later write.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, bool> {
        WatchStream::new(self.subscribe()).boxed()
    }
}
