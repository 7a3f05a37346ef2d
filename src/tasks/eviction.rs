//! Eviction Timers
//!
//! One timer task per settled cache slot. A timer sleeps for the slot's
//! lifetime and then runs its expiry callback.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::cache::SlotKey;

struct ArmedTimer {
    task: JoinHandle<()>,
    delay: Duration,
    generation: u64,
}

// == Timer Registry ==
/// Tracks the pending eviction timer of every slot.
///
/// Timers are keyed by the slot address itself, so replacing or deleting an
/// entry always finds the timer to cancel. At most one timer per slot is
/// armed at any instant.
pub(crate) struct TimerRegistry {
    runtime: Handle,
    timers: HashMap<SlotKey, ArmedTimer>,
}

impl TimerRegistry {
    pub(crate) fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: HashMap::new(),
        }
    }

    // == Arm ==
    /// Schedules `on_fire` to run after `delay`, replacing any timer the slot
    /// already had.
    ///
    /// The callback must call [`release`](Self::release) with the same
    /// generation before acting, which tells it whether it is still current.
    pub(crate) fn arm<F>(&mut self, slot: SlotKey, generation: u64, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.disarm(&slot);

        trace!(slot = %slot, delay_ms = delay.as_millis() as u64, "Arming eviction timer");
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire();
        });

        self.timers.insert(
            slot,
            ArmedTimer {
                task,
                delay,
                generation,
            },
        );
    }

    // == Disarm ==
    /// Cancels the slot's timer. Returns true if one was armed.
    pub(crate) fn disarm(&mut self, slot: &SlotKey) -> bool {
        match self.timers.remove(slot) {
            Some(timer) => {
                timer.task.abort();
                trace!(slot = %slot, "Disarmed eviction timer");
                true
            }
            None => false,
        }
    }

    // == Release ==
    /// Called by a firing timer. Forgets the timer and returns true only if it
    /// is still the one registered for the slot with this generation.
    pub(crate) fn release(&mut self, slot: &SlotKey, generation: u64) -> bool {
        match self.timers.get(slot) {
            Some(timer) if timer.generation == generation => {
                // Dropping the handle detaches the task, which is finishing anyway
                self.timers.remove(slot);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, slot: &SlotKey) -> bool {
        self.timers.contains_key(slot)
    }

    /// Returns the configured delay of the slot's armed timer.
    #[cfg(test)]
    pub(crate) fn delay_of(&self, slot: &SlotKey) -> Option<Duration> {
        self.timers.get(slot).map(|timer| timer.delay)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArgKey, QueryId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn slot(n: u32) -> SlotKey {
        SlotKey::new(QueryId::from_raw(1), ArgKey::encode(&(n,)).unwrap())
    }

    fn counting(fired: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let fired = fired.clone();
        move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerRegistry::new(Handle::current());

        timers.arm(slot(1), 1, Duration::from_millis(100), counting(&fired));
        assert!(timers.is_armed(&slot(1)));
        assert_eq!(timers.delay_of(&slot(1)), Some(Duration::from_millis(100)));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerRegistry::new(Handle::current());

        timers.arm(slot(1), 1, Duration::from_millis(50), counting(&fired));
        assert!(timers.disarm(&slot(1)));
        assert!(!timers.disarm(&slot(1)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timers.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerRegistry::new(Handle::current());

        timers.arm(slot(1), 1, Duration::from_millis(50), counting(&first));
        timers.arm(slot(1), 2, Duration::from_millis(80), counting(&second));
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_checks_generation() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerRegistry::new(Handle::current());

        timers.arm(slot(2), 7, Duration::from_secs(60), counting(&fired));
        assert!(!timers.release(&slot(2), 6));
        assert!(timers.is_armed(&slot(2)));

        assert!(timers.release(&slot(2), 7));
        assert!(!timers.is_armed(&slot(2)));
        assert!(!timers.release(&slot(2), 7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_timers() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let mut timers = TimerRegistry::new(Handle::current());
            timers.arm(slot(1), 1, Duration::from_millis(10), counting(&fired));
            timers.arm(slot(2), 1, Duration::from_millis(10), counting(&fired));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
