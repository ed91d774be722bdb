//! In-memory AuditStore with injectable failures and latency.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::AuditEvent;
use crate::domain::ports::{AuditQuery, AuditStore, AuditStoreError};

#[derive(Default)]
struct Inner {
    events: Vec<AuditEvent>,
    seen: HashSet<Uuid>,
}

#[derive(Clone, Default)]
pub struct InMemoryAuditStore {
    inner: Arc<RwLock<Inner>>,
    fail_next: Arc<AtomicUsize>,
    latency: Arc<RwLock<Option<Duration>>>,
    batch_calls: Arc<AtomicUsize>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` `store_batch` calls fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every `store_batch` call.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Number of `store_batch` calls, including failed ones.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn all(&self) -> Vec<AuditEvent> {
        self.inner.read().await.events.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn store_batch(&self, events: &[AuditEvent]) -> Result<(), AuditStoreError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let should_fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(AuditStoreError::Unavailable(
                "injected write failure".to_string(),
            ));
        }

        let mut inner = self.inner.write().await;
        for event in events {
            if inner.seen.insert(event.event_id) {
                inner.events.push(event.clone());
            }
        }
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, AuditStoreError> {
        let inner = self.inner.read().await;
        let matching = inner.events.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AuditPayload, Phase, PhaseTransitionData};

    fn event() -> AuditEvent {
        AuditEvent::new(
            "rr-1",
            AuditPayload::PhaseTransition(PhaseTransitionData {
                old_phase: Phase::Pending,
                new_phase: Phase::Investigating,
                reason: None,
            }),
        )
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = InMemoryAuditStore::new();
        store.fail_next_writes(1);

        let e = event();
        assert!(store.store_batch(std::slice::from_ref(&e)).await.is_err());
        store.store_batch(std::slice::from_ref(&e)).await.unwrap();
        store.store_batch(std::slice::from_ref(&e)).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.batch_calls(), 3);
    }
}
