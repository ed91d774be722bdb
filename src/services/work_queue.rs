//! De-duplicating work queue for resource keys.
//!
//! A key is held at most once in the queue and is never handed to two
//! workers at the same time: adding a key that is being processed marks it
//! dirty, and it is re-queued when the worker calls [`WorkQueue::done`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

use crate::domain::models::{ResourceKey, RetryConfig};

#[derive(Default)]
struct State {
    queue: VecDeque<ResourceKey>,
    /// Keys waiting in `queue` or waiting for `done`.
    dirty: HashSet<ResourceKey>,
    processing: HashSet<ResourceKey>,
    failures: HashMap<ResourceKey, u32>,
    shutting_down: bool,
}

pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl WorkQueue {
    pub fn new(backoff: &RetryConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            initial_backoff: Duration::from_millis(backoff.initial_backoff_ms.max(1)),
            max_backoff: Duration::from_millis(backoff.max_backoff_ms.max(backoff.initial_backoff_ms)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, key: ResourceKey) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Add `key` once `delay` has passed.
    pub fn add_after(self: &Arc<Self>, key: ResourceKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Re-add after a failure, backing off exponentially per key.
    /// Returns the delay used.
    pub fn add_rate_limited(self: &Arc<Self>, key: ResourceKey) -> Duration {
        let failures = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = self.backoff(failures);
        self.add_after(key, delay);
        delay
    }

    fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        let delay = self.initial_backoff.saturating_mul(1_u32 << exponent);
        delay.min(self.max_backoff)
    }

    /// Clear the failure history of `key`.
    pub fn forget(&self, key: &ResourceKey) {
        self.lock().failures.remove(key);
    }

    pub fn num_requeues(&self, key: &ResourceKey) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ResourceKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as finished; re-queues it if it was added meanwhile.
    pub fn done(&self, key: &ResourceKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Keys waiting to be handed out.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().processing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Arc<WorkQueue> {
        WorkQueue::new(&RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 80,
        })
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("default", name)
    }

    #[tokio::test]
    async fn test_duplicate_adds_collapse() {
        let queue = queue();
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
    }

    #[tokio::test]
    async fn test_key_is_not_handed_out_while_processing() {
        let queue = queue();
        queue.add(key("a"));
        let first = queue.get().await.unwrap();

        queue.add(key("a"));
        assert!(queue.is_empty(), "re-add while processing is deferred");

        queue.done(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[tokio::test]
    async fn test_get_waits_for_add() {
        let queue = queue();
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.add(key("late"));
        assert_eq!(waiter.await.unwrap(), Some(key("late")));
    }

    #[tokio::test]
    async fn test_add_after_delays() {
        let queue = queue();
        queue.add_after(key("a"), Duration::from_millis(30));
        assert!(queue.is_empty());
        let got = tokio::time::timeout(Duration::from_secs(1), queue.get())
            .await
            .unwrap();
        assert_eq!(got, Some(key("a")));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let queue = queue();
        assert_eq!(queue.backoff(1), Duration::from_millis(10));
        assert_eq!(queue.backoff(2), Duration::from_millis(20));
        assert_eq!(queue.backoff(3), Duration::from_millis(40));
        assert_eq!(queue.backoff(10), Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_rate_limited_tracks_failures_until_forget() {
        let queue = queue();
        assert_eq!(queue.add_rate_limited(key("a")), Duration::from_millis(10));
        assert_eq!(queue.add_rate_limited(key("a")), Duration::from_millis(20));
        assert_eq!(queue.num_requeues(&key("a")), 2);
        queue.forget(&key("a"));
        assert_eq!(queue.num_requeues(&key("a")), 0);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters_and_rejects_adds() {
        let queue = queue();
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.shutdown();
        assert_eq!(waiter.await.unwrap(), None);

        queue.add(key("a"));
        assert!(queue.is_empty());
        assert_eq!(queue.get().await, None);
    }
}
