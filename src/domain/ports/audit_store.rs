use async_trait::async_trait;

use crate::domain::models::{AuditCategory, AuditEvent, AuditEventType};
use crate::domain::ports::errors::AuditStoreError;

/// Audit trail query. Results come back in emission order.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub correlation_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    pub event_category: Option<AuditCategory>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn for_correlation(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            ..Default::default()
        }
    }

    pub fn with_event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_category(mut self, category: AuditCategory) -> Self {
        self.event_category = Some(category);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.correlation_id
            .as_ref()
            .map_or(true, |c| &event.correlation_id == c)
            && self.event_type.map_or(true, |t| event.event_type() == t)
            && self
                .event_category
                .map_or(true, |c| event.event_category == c)
    }
}

/// Durable append-only store for audit events.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a batch. Re-storing an event ID already present is a no-op.
    async fn store_batch(&self, events: &[AuditEvent]) -> Result<(), AuditStoreError>;

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, AuditStoreError>;
}
