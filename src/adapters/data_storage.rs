//! HTTP adapter for the data storage service's audit API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::models::{AuditEvent, AuditRecord};
use crate::domain::ports::{AuditQuery, AuditStore, AuditStoreError};

/// Audit store backed by `POST /api/v1/audit/events/batch` and
/// `GET /api/v1/audit/events`.
pub struct HttpAuditStore {
    http_client: ReqwestClient,
    base_url: String,
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    events: &'a [AuditRecord],
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Vec<AuditRecord>,
}

impl HttpAuditStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .context("Failed to build data storage HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

async fn error_for_status(response: Response) -> Result<Response, AuditStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());
    Err(AuditStoreError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AuditStore for HttpAuditStore {
    async fn store_batch(&self, events: &[AuditEvent]) -> Result<(), AuditStoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let records = events
            .iter()
            .map(AuditEvent::to_record)
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .http_client
            .post(format!("{}/api/v1/audit/events/batch", self.base_url))
            .json(&BatchRequest { events: &records })
            .send()
            .await?;
        error_for_status(response).await?;

        debug!(count = records.len(), "Stored audit batch");
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>, AuditStoreError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(correlation_id) = &query.correlation_id {
            params.push(("correlation_id", correlation_id.clone()));
        }
        if let Some(event_type) = query.event_type {
            params.push(("event_type", event_type.as_str().to_string()));
        }
        if let Some(category) = query.event_category {
            params.push(("event_category", category.as_str().to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        let response = self
            .http_client
            .get(format!("{}/api/v1/audit/events", self.base_url))
            .query(&params)
            .send()
            .await?;
        let body: QueryResponse = error_for_status(response).await?.json().await?;

        body.data
            .into_iter()
            .map(|record| AuditEvent::try_from(record).map_err(AuditStoreError::from))
            .collect()
    }
}
