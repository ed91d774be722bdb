use async_trait::async_trait;

use crate::domain::models::{InvestigationRequest, PollOutcome, RecoveryRequest, SubmitOutcome};
use crate::domain::ports::errors::InvestigationError;

/// Port for the external investigation service.
///
/// The service may answer a submit synchronously or hand back a session ID
/// to poll. Sessions can be forgotten at any time; a poll against one
/// returns [`PollOutcome::SessionNotFound`] rather than an error.
#[async_trait]
pub trait InvestigationClient: Send + Sync {
    /// Start an investigation for a first-time signal
    async fn submit(
        &self,
        request: &InvestigationRequest,
    ) -> Result<SubmitOutcome, InvestigationError>;

    /// Start an investigation that carries previous execution history
    async fn submit_recovery(
        &self,
        request: &RecoveryRequest,
    ) -> Result<SubmitOutcome, InvestigationError>;

    /// Poll an open session
    async fn poll(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<PollOutcome, InvestigationError>;
}
