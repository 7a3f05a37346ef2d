//! Host State Container
//!
//! The cache never decides who is listening. After each committed mutation it
//! hands a [`CacheChange`] to a [`StateHost`], which fans it out to
//! subscribers. Readers then pull the current state from the cache itself.

use tokio::sync::broadcast;

use crate::models::CacheChange;

/// Default buffer size of [`BroadcastHost`]
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;

// == State Host ==
/// Receives one notification per cache mutation, in mutation order.
///
/// `publish` runs while the cache holds its internal lock: implementations
/// must return quickly and must not call back into the cache.
pub trait StateHost: Send + Sync + 'static {
    fn publish(&self, change: &CacheChange);
}

// == Broadcast Host ==
/// [`StateHost`] backed by a tokio broadcast channel.
///
/// Slow subscribers that fall more than the channel capacity behind observe
/// `RecvError::Lagged` and should re-read the cache snapshot.
#[derive(Debug, Clone)]
pub struct BroadcastHost {
    sender: broadcast::Sender<CacheChange>,
}

impl BroadcastHost {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber. It receives changes published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastHost {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_CAPACITY)
    }
}

impl StateHost for BroadcastHost {
    fn publish(&self, change: &CacheChange) {
        // No subscribers is not an error
        let _ = self.sender.send(change.clone());
    }
}
