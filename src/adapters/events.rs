//! Event recorders for the per-resource event stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::domain::models::{EventReason, EventType, ResourceEvent, ResourceKey};
use crate::domain::ports::EventRecorder;

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, event: ResourceEvent) {
        match event.event_type {
            EventType::Normal => info!(
                resource = %event.key,
                reason = %event.reason,
                event_type = %event.event_type,
                "{}", event.message
            ),
            EventType::Warning => warn!(
                resource = %event.key,
                reason = %event.reason,
                event_type = %event.event_type,
                "{}", event.message
            ),
        }
    }
}

/// Keeps the ordered event stream of every resource.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventRecorder {
    events: Arc<Mutex<HashMap<ResourceKey, Vec<ResourceEvent>>>>,
}

impl InMemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded for `key`, oldest first.
    pub fn events_for(&self, key: &ResourceKey) -> Vec<ResourceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn reasons_for(&self, key: &ResourceKey) -> Vec<EventReason> {
        self.events_for(key).into_iter().map(|e| e.reason).collect()
    }

    pub fn count(&self, key: &ResourceKey, reason: EventReason) -> usize {
        self.events_for(key)
            .iter()
            .filter(|e| e.reason == reason)
            .count()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn record(&self, event: ResourceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.key.clone())
            .or_default()
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_recorder_keeps_order() {
        let recorder = InMemoryEventRecorder::new();
        let key = ResourceKey::new("default", "a1");
        recorder.record(ResourceEvent::new(key.clone(), EventReason::AIAnalysisCreated, "created"));
        recorder.record(ResourceEvent::new(key.clone(), EventReason::SessionLost, "lost"));

        assert_eq!(
            recorder.reasons_for(&key),
            vec![EventReason::AIAnalysisCreated, EventReason::SessionLost]
        );
        let events = recorder.events_for(&key);
        assert_eq!(events[1].event_type, EventType::Warning);
        assert_eq!(recorder.count(&key, EventReason::SessionLost), 1);
        assert!(recorder.events_for(&ResourceKey::new("default", "other")).is_empty());
    }
}
