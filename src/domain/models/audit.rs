//! Audit event model.
//!
//! Events are append-only. Each event type has exactly one payload struct;
//! [`AuditPayload`] is the tagged union over them and [`AuditRecord`] is the
//! flat wire/row shape where `event_data` is discriminated by `event_type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::analysis::{ConfidenceLevel, Phase, ResourceKey};

/// Actor recorded on every event this controller emits.
pub const CONTROLLER_ACTOR: &str = "aianalysis-controller";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "aianalysis.phase.transition")]
    PhaseTransition,
    #[serde(rename = "aianalysis.investigation.call")]
    InvestigationCall,
    #[serde(rename = "aianalysis.session.lifecycle")]
    SessionLifecycle,
    #[serde(rename = "aianalysis.policy.evaluation")]
    PolicyEvaluation,
    #[serde(rename = "aianalysis.approval.decision")]
    ApprovalDecision,
    #[serde(rename = "aianalysis.analysis.completed")]
    AnalysisCompleted,
    #[serde(rename = "aianalysis.analysis.failed")]
    AnalysisFailed,
    #[serde(rename = "aianalysis.error.occurred")]
    ErrorOccurred,
}

impl AuditEventType {
    pub const ALL: [Self; 8] = [
        Self::PhaseTransition,
        Self::InvestigationCall,
        Self::SessionLifecycle,
        Self::PolicyEvaluation,
        Self::ApprovalDecision,
        Self::AnalysisCompleted,
        Self::AnalysisFailed,
        Self::ErrorOccurred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhaseTransition => "aianalysis.phase.transition",
            Self::InvestigationCall => "aianalysis.investigation.call",
            Self::SessionLifecycle => "aianalysis.session.lifecycle",
            Self::PolicyEvaluation => "aianalysis.policy.evaluation",
            Self::ApprovalDecision => "aianalysis.approval.decision",
            Self::AnalysisCompleted => "aianalysis.analysis.completed",
            Self::AnalysisFailed => "aianalysis.analysis.failed",
            Self::ErrorOccurred => "aianalysis.error.occurred",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Types that occur at most once per analysis lifecycle.
    pub fn is_once_per_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::ApprovalDecision | Self::AnalysisCompleted | Self::AnalysisFailed
        )
    }

    /// The `event_action` recorded for this type.
    pub fn action(&self) -> &'static str {
        match self {
            Self::PhaseTransition => "phase_transition",
            Self::InvestigationCall => "investigation_call",
            Self::SessionLifecycle => "session_lifecycle",
            Self::PolicyEvaluation => "policy_evaluation",
            Self::ApprovalDecision => "approval_decision",
            Self::AnalysisCompleted => "analysis_completed",
            Self::AnalysisFailed => "analysis_failed",
            Self::ErrorOccurred => "error_occurred",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owning subsystem of an event. Queries filter on it to separate this
/// controller's trail from the investigation service's own events that
/// share a correlation ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Analysis,
    Investigation,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Investigation => "investigation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "analysis" => Some(Self::Analysis),
            "investigation" => Some(Self::Investigation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransitionData {
    pub old_phase: Phase,
    pub new_phase: Phase,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationOperation {
    Submit,
    SubmitRecovery,
    Poll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationCallData {
    pub operation: InvestigationOperation,
    #[serde(default)]
    pub session_id: Option<String>,
    pub duration_ms: u64,
    /// `pending`, `completed`, `session_not_found`, `accepted` or `error`.
    pub result: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionAction {
    Created,
    Lost,
    RegenerationExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLifecycleData {
    pub action: SessionAction,
    #[serde(default)]
    pub session_id: Option<String>,
    pub generation: u32,
    pub poll_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluationData {
    pub environment: String,
    pub confidence: f64,
    pub approval_required: bool,
    pub degraded: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecisionData {
    /// `auto_approved` or `requires_approval`.
    pub decision: String,
    pub approval_required: bool,
    pub workflow_id: String,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub reason: String,
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCompletedData {
    pub reason: String,
    #[serde(default)]
    pub sub_reason: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub approval_required: bool,
    #[serde(default)]
    pub investigation_time_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFailedData {
    pub failed_phase: Phase,
    pub reason: String,
    #[serde(default)]
    pub sub_reason: Option<String>,
    pub message: String,
    pub needs_human_review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOccurredData {
    pub phase: Phase,
    pub operation: String,
    pub error: String,
    pub transient: bool,
}

/// Typed event payload; the variant determines the event type.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditPayload {
    PhaseTransition(PhaseTransitionData),
    InvestigationCall(InvestigationCallData),
    SessionLifecycle(SessionLifecycleData),
    PolicyEvaluation(PolicyEvaluationData),
    ApprovalDecision(ApprovalDecisionData),
    AnalysisCompleted(AnalysisCompletedData),
    AnalysisFailed(AnalysisFailedData),
    ErrorOccurred(ErrorOccurredData),
}

impl AuditPayload {
    pub fn event_type(&self) -> AuditEventType {
        match self {
            Self::PhaseTransition(_) => AuditEventType::PhaseTransition,
            Self::InvestigationCall(_) => AuditEventType::InvestigationCall,
            Self::SessionLifecycle(_) => AuditEventType::SessionLifecycle,
            Self::PolicyEvaluation(_) => AuditEventType::PolicyEvaluation,
            Self::ApprovalDecision(_) => AuditEventType::ApprovalDecision,
            Self::AnalysisCompleted(_) => AuditEventType::AnalysisCompleted,
            Self::AnalysisFailed(_) => AuditEventType::AnalysisFailed,
            Self::ErrorOccurred(_) => AuditEventType::ErrorOccurred,
        }
    }

    fn default_outcome(&self) -> AuditOutcome {
        match self {
            Self::AnalysisFailed(_) | Self::ErrorOccurred(_) => AuditOutcome::Failure,
            Self::InvestigationCall(data) if data.error.is_some() => AuditOutcome::Failure,
            Self::SessionLifecycle(data) if data.action != SessionAction::Created => {
                AuditOutcome::Failure
            }
            _ => AuditOutcome::Success,
        }
    }

    pub fn encode(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::PhaseTransition(d) => serde_json::to_value(d),
            Self::InvestigationCall(d) => serde_json::to_value(d),
            Self::SessionLifecycle(d) => serde_json::to_value(d),
            Self::PolicyEvaluation(d) => serde_json::to_value(d),
            Self::ApprovalDecision(d) => serde_json::to_value(d),
            Self::AnalysisCompleted(d) => serde_json::to_value(d),
            Self::AnalysisFailed(d) => serde_json::to_value(d),
            Self::ErrorOccurred(d) => serde_json::to_value(d),
        }
    }

    pub fn decode(
        event_type: AuditEventType,
        data: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match event_type {
            AuditEventType::PhaseTransition => Self::PhaseTransition(serde_json::from_value(data)?),
            AuditEventType::InvestigationCall => {
                Self::InvestigationCall(serde_json::from_value(data)?)
            }
            AuditEventType::SessionLifecycle => {
                Self::SessionLifecycle(serde_json::from_value(data)?)
            }
            AuditEventType::PolicyEvaluation => {
                Self::PolicyEvaluation(serde_json::from_value(data)?)
            }
            AuditEventType::ApprovalDecision => {
                Self::ApprovalDecision(serde_json::from_value(data)?)
            }
            AuditEventType::AnalysisCompleted => {
                Self::AnalysisCompleted(serde_json::from_value(data)?)
            }
            AuditEventType::AnalysisFailed => Self::AnalysisFailed(serde_json::from_value(data)?),
            AuditEventType::ErrorOccurred => Self::ErrorOccurred(serde_json::from_value(data)?),
        })
    }
}

/// A single audit event.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_category: AuditCategory,
    pub event_outcome: AuditOutcome,
    pub correlation_id: String,
    pub actor_id: String,
    pub resource: Option<ResourceKey>,
    pub payload: AuditPayload,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(correlation_id: impl Into<String>, payload: AuditPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_category: AuditCategory::Analysis,
            event_outcome: payload.default_outcome(),
            correlation_id: correlation_id.into(),
            actor_id: CONTROLLER_ACTOR.to_string(),
            resource: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn with_resource(mut self, key: ResourceKey) -> Self {
        self.resource = Some(key);
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.event_outcome = outcome;
        self
    }

    pub fn with_category(mut self, category: AuditCategory) -> Self {
        self.event_category = category;
        self
    }

    pub fn event_type(&self) -> AuditEventType {
        self.payload.event_type()
    }

    pub fn event_action(&self) -> &'static str {
        self.event_type().action()
    }

    pub fn to_record(&self) -> Result<AuditRecord, serde_json::Error> {
        Ok(AuditRecord {
            event_id: self.event_id,
            event_type: self.event_type().as_str().to_string(),
            event_category: self.event_category.as_str().to_string(),
            event_action: self.event_action().to_string(),
            event_outcome: self.event_outcome.as_str().to_string(),
            correlation_id: self.correlation_id.clone(),
            actor_id: self.actor_id.clone(),
            resource_namespace: self.resource.as_ref().map(|k| k.namespace.clone()),
            resource_name: self.resource.as_ref().map(|k| k.name.clone()),
            event_data: self.payload.encode()?,
            event_timestamp: self.timestamp,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditDecodeError {
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
    #[error("Unknown event category: {0}")]
    UnknownCategory(String),
    #[error("Unknown event outcome: {0}")]
    UnknownOutcome(String),
    #[error("Invalid event data for {event_type}: {source}")]
    InvalidData {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Flat wire and storage representation of an [`AuditEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub event_type: String,
    pub event_category: String,
    pub event_action: String,
    pub event_outcome: String,
    pub correlation_id: String,
    pub actor_id: String,
    #[serde(default)]
    pub resource_namespace: Option<String>,
    #[serde(default)]
    pub resource_name: Option<String>,
    pub event_data: serde_json::Value,
    pub event_timestamp: DateTime<Utc>,
}

impl TryFrom<AuditRecord> for AuditEvent {
    type Error = AuditDecodeError;

    fn try_from(record: AuditRecord) -> Result<Self, Self::Error> {
        let event_type = AuditEventType::from_str(&record.event_type)
            .ok_or_else(|| AuditDecodeError::UnknownEventType(record.event_type.clone()))?;
        let event_category = AuditCategory::from_str(&record.event_category)
            .ok_or_else(|| AuditDecodeError::UnknownCategory(record.event_category.clone()))?;
        let event_outcome = AuditOutcome::from_str(&record.event_outcome)
            .ok_or_else(|| AuditDecodeError::UnknownOutcome(record.event_outcome.clone()))?;
        let payload = AuditPayload::decode(event_type, record.event_data).map_err(|source| {
            AuditDecodeError::InvalidData {
                event_type: record.event_type.clone(),
                source,
            }
        })?;
        let resource = match (record.resource_namespace, record.resource_name) {
            (Some(namespace), Some(name)) => Some(ResourceKey { namespace, name }),
            _ => None,
        };

        Ok(Self {
            event_id: record.event_id,
            event_category,
            event_outcome,
            correlation_id: record.correlation_id,
            actor_id: record.actor_id,
            resource,
            payload,
            timestamp: record.event_timestamp,
        })
    }
}
