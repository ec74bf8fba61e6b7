//! Ack correlation: id allocation and the pending-waiter registry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

/// Per-channel request/response correlation state.
///
/// Ids are strictly increasing and never reused within the channel's life.
/// A waiter is parked when an AckRequest is sent and taken out on whichever
/// comes first: reply delivery or the caller's deadline.
#[derive(Debug, Default)]
pub struct AckCorrelator {
    counter: AtomicU64,
    waiters: Mutex<HashMap<u64, oneshot::Sender<String>>>,
}

impl AckCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next correlation id. First id is 1.
    pub fn next_id(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Park a waiter for `id`. Overwrites any stale entry under the same id
    /// (cannot happen while ids are unique, but the map stays consistent).
    pub fn add_waiter(&self, id: u64, tx: oneshot::Sender<String>) {
        self.waiters.lock().expect("waiter map poisoned").insert(id, tx);
    }

    /// Drop the waiter for `id`, if any. Called on deadline expiry.
    pub fn remove_waiter(&self, id: u64) {
        self.waiters.lock().expect("waiter map poisoned").remove(&id);
    }

    /// Take the waiter for `id` out of the registry. `None` means the reply
    /// is late or unknown — callers discard it silently, never treat it as
    /// fatal.
    pub fn take_waiter(&self, id: u64) -> Option<oneshot::Sender<String>> {
        self.waiters.lock().expect("waiter map poisoned").remove(&id)
    }

    /// Drop every parked waiter. Their receivers observe the sender side
    /// gone and fail immediately instead of waiting out their deadlines.
    /// Called once during channel teardown.
    pub fn drain(&self) {
        self.waiters.lock().expect("waiter map poisoned").clear();
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_strictly_increasing() {
        let ack = AckCorrelator::new();
        let mut last = 0;
        for _ in 0..100 {
            let id = ack.next_id();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn concurrent_ids_are_distinct() {
        let ack = Arc::new(AckCorrelator::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ack = ack.clone();
            handles.push(std::thread::spawn(move || {
                let ids: Vec<u64> = (0..1000).map(|_| ack.next_id()).collect();
                // Strictly increasing in call order per caller.
                assert!(ids.windows(2).all(|w| w[0] < w[1]));
                ids
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate ack id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[test]
    fn take_waiter_removes_the_entry() {
        let ack = AckCorrelator::new();
        let (tx, mut rx) = oneshot::channel();
        let id = ack.next_id();
        ack.add_waiter(id, tx);

        let tx = ack.take_waiter(id).expect("waiter present");
        assert_eq!(ack.waiter_count(), 0);
        tx.send("\"pong\"".to_string()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "\"pong\"");

        // A second take is the late-reply path: silently absent.
        assert!(ack.take_waiter(id).is_none());
    }

    #[test]
    fn drain_fails_every_parked_receiver() {
        let ack = AckCorrelator::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = oneshot::channel();
            ack.add_waiter(ack.next_id(), tx);
            receivers.push(rx);
        }

        ack.drain();
        assert_eq!(ack.waiter_count(), 0);
        for mut rx in receivers {
            assert!(matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Closed)));
        }
    }

    #[test]
    fn remove_waiter_tolerates_absent_ids() {
        let ack = AckCorrelator::new();
        ack.remove_waiter(42);
        let (tx, _rx) = oneshot::channel();
        ack.add_waiter(7, tx);
        ack.remove_waiter(7);
        assert_eq!(ack.waiter_count(), 0);
    }
}
