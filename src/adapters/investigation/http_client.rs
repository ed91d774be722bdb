//! HTTP adapter for the investigation service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::retry::RetryPolicy;
use crate::domain::models::{
    InvestigationConfig, InvestigationRequest, InvestigationResult, PollOutcome, RecoveryRequest,
    SubmitOutcome,
};
use crate::domain::ports::{InvestigationClient, InvestigationError};

const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// reqwest-backed [`InvestigationClient`].
///
/// Transient failures (429, 5xx, timeouts, connection errors) are retried
/// in-call with exponential backoff before being returned.
pub struct HttpInvestigationClient {
    http_client: ReqwestClient,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl HttpInvestigationClient {
    pub fn new(config: &InvestigationConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build investigation HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::from(&config.retry),
        })
    }

    /// Override the retry policy (tests use fast or no retries)
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    async fn post_submit<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        correlation_id: &str,
    ) -> Result<SubmitOutcome, InvestigationError> {
        let response = self
            .http_client
            .post(format!("{}{path}", self.base_url))
            .header(CORRELATION_HEADER, correlation_id)
            .json(body)
            .send()
            .await?;

        let response = error_for_status(response).await?;
        let parsed: SubmitResponse = decode(response).await?;
        Ok(match parsed {
            SubmitResponse::Session { session_id } if !session_id.is_empty() => {
                SubmitOutcome::Session(session_id)
            }
            SubmitResponse::Session { .. } => {
                return Err(InvestigationError::InvalidResponse(
                    "empty session_id".to_string(),
                ))
            }
            SubmitResponse::Result(result) => SubmitOutcome::Completed(result),
        })
    }

    async fn get_session(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<PollOutcome, InvestigationError> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/investigate/{session_id}", self.base_url))
            .header(CORRELATION_HEADER, correlation_id)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(PollOutcome::SessionNotFound),
            StatusCode::ACCEPTED => return Ok(PollOutcome::Pending),
            _ => {}
        }

        let response = error_for_status(response).await?;
        let parsed: PollResponse = decode(response).await?;
        match parsed.status {
            SessionStatus::Pending | SessionStatus::Running => Ok(PollOutcome::Pending),
            SessionStatus::Completed => parsed
                .result
                .map(PollOutcome::Completed)
                .ok_or_else(|| {
                    InvestigationError::InvalidResponse(
                        "completed session without result".to_string(),
                    )
                }),
            SessionStatus::Failed => Err(InvestigationError::Failed(
                parsed
                    .error
                    .unwrap_or_else(|| "investigation failed without detail".to_string()),
            )),
        }
    }
}

#[async_trait]
impl InvestigationClient for HttpInvestigationClient {
    #[instrument(skip(self, request), fields(correlation_id = %request.remediation_id))]
    async fn submit(
        &self,
        request: &InvestigationRequest,
    ) -> Result<SubmitOutcome, InvestigationError> {
        self.retry_policy
            .execute(|| self.post_submit("/api/v1/investigate", request, &request.remediation_id))
            .await
    }

    #[instrument(
        skip(self, request),
        fields(
            correlation_id = %request.investigation.remediation_id,
            attempt = request.recovery_attempt_number
        )
    )]
    async fn submit_recovery(
        &self,
        request: &RecoveryRequest,
    ) -> Result<SubmitOutcome, InvestigationError> {
        self.retry_policy
            .execute(|| {
                self.post_submit(
                    "/api/v1/recovery/analyze",
                    request,
                    &request.investigation.remediation_id,
                )
            })
            .await
    }

    #[instrument(skip(self))]
    async fn poll(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<PollOutcome, InvestigationError> {
        let outcome = self
            .retry_policy
            .execute(|| self.get_session(session_id, correlation_id))
            .await?;
        debug!(?outcome, "Polled investigation session");
        Ok(outcome)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubmitResponse {
    Session { session_id: String },
    Result(Box<InvestigationResult>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SessionStatus {
    #[serde(alias = "queued")]
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    status: SessionStatus,
    #[serde(default)]
    result: Option<Box<InvestigationResult>>,
    #[serde(default)]
    error: Option<String>,
}

async fn error_for_status(response: Response) -> Result<Response, InvestigationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());
    Err(from_status(status, body))
}

fn from_status(status: StatusCode, message: String) -> InvestigationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => InvestigationError::RateLimited,
        StatusCode::NOT_FOUND => InvestigationError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => InvestigationError::Timeout,
        s if s.is_server_error() => InvestigationError::ServerError {
            status: s.as_u16(),
            message,
        },
        s => InvestigationError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, InvestigationError> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| InvestigationError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            from_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            InvestigationError::RateLimited
        ));
        assert!(from_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(from_status(StatusCode::GATEWAY_TIMEOUT, String::new()).is_transient());
        assert!(from_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()).is_permanent());
    }

    #[test]
    fn test_submit_response_shapes() {
        let session: SubmitResponse =
            serde_json::from_str(r#"{"session_id": "s-1"}"#).unwrap();
        assert!(matches!(session, SubmitResponse::Session { session_id } if session_id == "s-1"));

        let result: SubmitResponse = serde_json::from_str(
            r#"{"confidence": 0.9, "selected_workflow": {"workflow_id": "restart-pod"}}"#,
        )
        .unwrap();
        assert!(matches!(result, SubmitResponse::Result(r) if r.confidence == 0.9));
    }
}
