//! SQLite implementation of the AuditStore.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::parse_datetime;
use crate::domain::models::{AuditEvent, AuditRecord};
use crate::domain::ports::{AuditQuery, AuditStore, AuditStoreError};

#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn store_batch(&self, events: &[AuditEvent]) -> Result<(), AuditStoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            let record = event.to_record()?;
            let data_json = serde_json::to_string(&record.event_data)?;

            sqlx::query(
                r#"INSERT OR IGNORE INTO audit_events
                   (event_id, event_type, event_category, event_action, event_outcome, correlation_id,
                    actor_id, resource_namespace, resource_name, event_data, event_timestamp)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(record.event_id.to_string())
            .bind(&record.event_type)
            .bind(&record.event_category)
            .bind(&record.event_action)
            .bind(&record.event_outcome)
            .bind(&record.correlation_id)
            .bind(&record.actor_id)
            .bind(&record.resource_namespace)
            .bind(&record.resource_name)
            .bind(&data_json)
            .bind(record.event_timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, AuditStoreError> {
        let mut sql = String::from(
            "SELECT event_id, event_type, event_category, event_action, event_outcome, correlation_id, \
             actor_id, resource_namespace, resource_name, event_data, event_timestamp \
             FROM audit_events WHERE 1=1",
        );
        let mut bindings: Vec<String> = Vec::new();

        if let Some(correlation_id) = &query.correlation_id {
            sql.push_str(" AND correlation_id = ?");
            bindings.push(correlation_id.clone());
        }
        if let Some(event_type) = query.event_type {
            sql.push_str(" AND event_type = ?");
            bindings.push(event_type.as_str().to_string());
        }
        if let Some(category) = query.event_category {
            sql.push_str(" AND event_category = ?");
            bindings.push(category.as_str().to_string());
        }

        sql.push_str(" ORDER BY seq ASC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, AuditRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(AuditRow::into_event).collect()
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    event_id: String,
    event_type: String,
    event_category: String,
    event_action: String,
    event_outcome: String,
    correlation_id: String,
    actor_id: String,
    resource_namespace: Option<String>,
    resource_name: Option<String>,
    event_data: String,
    event_timestamp: String,
}

impl AuditRow {
    fn into_event(self) -> Result<AuditEvent, AuditStoreError> {
        let event_id = Uuid::parse_str(&self.event_id)
            .map_err(|e| AuditStoreError::Unavailable(format!("corrupt event id: {e}")))?;
        let event_timestamp = parse_datetime(&self.event_timestamp)
            .map_err(|e| AuditStoreError::Unavailable(format!("corrupt timestamp: {e}")))?;

        let record = AuditRecord {
            event_id,
            event_type: self.event_type,
            event_category: self.event_category,
            event_action: self.event_action,
            event_outcome: self.event_outcome,
            correlation_id: self.correlation_id,
            actor_id: self.actor_id,
            resource_namespace: self.resource_namespace,
            resource_name: self.resource_name,
            event_data: serde_json::from_str(&self.event_data)?,
            event_timestamp,
        };
        Ok(AuditEvent::try_from(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{
        AuditCategory, AuditEventType, AuditPayload, ErrorOccurredData, Phase,
        PhaseTransitionData, ResourceKey,
    };

    async fn setup_store() -> SqliteAuditStore {
        SqliteAuditStore::new(create_migrated_test_pool().await.unwrap())
    }

    fn transition(corr: &str, from: Phase, to: Phase) -> AuditEvent {
        AuditEvent::new(
            corr,
            AuditPayload::PhaseTransition(PhaseTransitionData {
                old_phase: from,
                new_phase: to,
                reason: None,
            }),
        )
        .with_resource(ResourceKey::new("default", "a1"))
    }

    #[tokio::test]
    async fn test_store_and_query_in_order() {
        let store = setup_store().await;
        let events = vec![
            transition("rr-1", Phase::Pending, Phase::Investigating),
            transition("rr-1", Phase::Investigating, Phase::Analyzing),
            transition("rr-2", Phase::Pending, Phase::Investigating),
        ];
        store.store_batch(&events).await.unwrap();

        let found = store.query(&AuditQuery::for_correlation("rr-1")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], events[0]);
        assert_eq!(found[1], events[1]);
    }

    #[tokio::test]
    async fn test_restoring_same_event_is_idempotent() {
        let store = setup_store().await;
        let event = transition("rr-1", Phase::Pending, Phase::Investigating);
        store.store_batch(std::slice::from_ref(&event)).await.unwrap();
        store.store_batch(std::slice::from_ref(&event)).await.unwrap();

        let found = store.query(&AuditQuery::for_correlation("rr-1")).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_query_filters_type_and_category() {
        let store = setup_store().await;
        let error = AuditEvent::new(
            "rr-1",
            AuditPayload::ErrorOccurred(ErrorOccurredData {
                phase: Phase::Investigating,
                operation: "poll".to_string(),
                error: "timeout".to_string(),
                transient: true,
            }),
        );
        let foreign = transition("rr-1", Phase::Pending, Phase::Investigating)
            .with_category(AuditCategory::Investigation);
        store
            .store_batch(&[
                transition("rr-1", Phase::Pending, Phase::Investigating),
                error,
                foreign,
            ])
            .await
            .unwrap();

        let transitions = store
            .query(
                &AuditQuery::for_correlation("rr-1")
                    .with_event_type(AuditEventType::PhaseTransition)
                    .with_category(AuditCategory::Analysis),
            )
            .await
            .unwrap();
        assert_eq!(transitions.len(), 1);

        let limited = store
            .query(&AuditQuery::for_correlation("rr-1").with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
