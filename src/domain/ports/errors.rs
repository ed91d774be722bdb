use thiserror::Error;

use crate::domain::models::audit::AuditDecodeError;
use crate::domain::models::ResourceKey;

/// Status store errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Analysis not found: {0}")]
    NotFound(ResourceKey),

    #[error("Analysis already exists: {0}")]
    AlreadyExists(ResourceKey),

    /// The caller read a stale resource version; nothing was written.
    #[error("Conflict updating {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: ResourceKey,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl RepositoryError {
    /// Conflicts and database hiccups resolve on a later reconcile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::QueryFailed(_))
    }
}

/// Errors talking to the investigation service.
///
/// A forgotten session is not an error; it is reported as
/// [`PollOutcome::SessionNotFound`](crate::domain::models::PollOutcome).
#[derive(Debug, Error)]
pub enum InvestigationError {
    /// Request rejected by the service (4xx other than 404/429)
    #[error("Investigation request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Resource not found on a submit endpoint
    #[error("Investigation endpoint not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Investigation service error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    /// Response body could not be decoded or violates the contract
    #[error("Invalid investigation response: {0}")]
    InvalidResponse(String),

    /// The service reported the investigation itself as failed
    #[error("Investigation failed: {0}")]
    Failed(String),
}

impl InvestigationError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError { .. } | Self::Network(_) | Self::Timeout
        )
    }

    /// Returns true if this is a permanent error that should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl From<reqwest::Error> for InvestigationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Audit store errors
#[derive(Debug, Error)]
pub enum AuditStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Data storage returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Undecodable audit record: {0}")]
    Decode(#[from] AuditDecodeError),

    #[error("Audit store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_investigation_errors() {
        assert!(InvestigationError::RateLimited.is_transient());
        assert!(InvestigationError::Timeout.is_transient());
        assert!(InvestigationError::Network("reset".to_string()).is_transient());
        assert!(InvestigationError::ServerError {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_permanent_investigation_errors() {
        let rejected = InvestigationError::Rejected {
            status: 400,
            message: "bad signal".to_string(),
        };
        assert!(rejected.is_permanent());
        assert!(!rejected.is_transient());
        assert!(InvestigationError::InvalidResponse("{}".to_string()).is_permanent());
        assert!(InvestigationError::Failed("llm crashed".to_string()).is_permanent());
    }

    #[test]
    fn test_conflict_is_transient() {
        let err = RepositoryError::Conflict {
            key: ResourceKey::new("default", "a"),
            expected: 1,
            actual: 2,
        };
        assert!(err.is_transient());
        assert!(!RepositoryError::NotFound(ResourceKey::new("default", "a")).is_transient());
    }
}
