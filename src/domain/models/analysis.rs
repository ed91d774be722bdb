//! Analysis domain model.
//!
//! An analysis couples an immutable request, set when the resource is
//! created, with a status that only the reconciler mutates. Phases move
//! forward only: `Pending -> Investigating -> Analyzing -> Completed | Failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::error::AnalysisError;

/// Namespaced identity of an analysis resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a `namespace/name` string. A bare name lands in `default`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Some(Self::new(ns, name)),
            Some(_) => None,
            None if !s.is_empty() => Some(Self::new("default", s)),
            None => None,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Lifecycle phase of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Investigating,
    Analyzing,
    Completed,
    Failed,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Pending
    }
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Investigating => "Investigating",
            Self::Analyzing => "Analyzing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "investigating" => Some(Self::Investigating),
            "analyzing" => Some(Self::Analyzing),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Completed and Failed are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the lifecycle; valid transitions strictly increase it.
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Investigating => 1,
            Self::Analyzing => 2,
            Self::Completed | Self::Failed => 3,
        }
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(&self) -> &'static [Phase] {
        match self {
            Self::Pending => &[Self::Investigating, Self::Failed],
            Self::Investigating => &[Self::Analyzing, Self::Completed, Self::Failed],
            Self::Analyzing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Umbrella classification of a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    /// Workflow selected and approval decision recorded.
    AnalysisCompleted,
    /// Investigation concluded that no remediation is needed.
    WorkflowNotNeeded,
    /// No usable workflow could be resolved.
    WorkflowResolutionFailed,
    /// The investigation service rejected the request or returned garbage.
    InvestigationFailed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalysisCompleted => "AnalysisCompleted",
            Self::WorkflowNotNeeded => "WorkflowNotNeeded",
            Self::WorkflowResolutionFailed => "WorkflowResolutionFailed",
            Self::InvestigationFailed => "InvestigationFailed",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specific classification under a [`Reason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubReason {
    LowConfidence,
    NoMatchingWorkflows,
    #[serde(rename = "LLMParsingError")]
    LlmParsingError,
    WorkflowNotFound,
    ImageMismatch,
    ParameterValidationFailed,
    InvestigationInconclusive,
    SessionRegenerationExceeded,
    ProblemResolved,
    PermanentApiError,
    InvalidResponse,
    /// The analysis request failed validation.
    InvalidRequest,
    /// Human review requested for a reason this controller does not know.
    Unclassified,
}

impl SubReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "LowConfidence",
            Self::NoMatchingWorkflows => "NoMatchingWorkflows",
            Self::LlmParsingError => "LLMParsingError",
            Self::WorkflowNotFound => "WorkflowNotFound",
            Self::ImageMismatch => "ImageMismatch",
            Self::ParameterValidationFailed => "ParameterValidationFailed",
            Self::InvestigationInconclusive => "InvestigationInconclusive",
            Self::SessionRegenerationExceeded => "SessionRegenerationExceeded",
            Self::ProblemResolved => "ProblemResolved",
            Self::PermanentApiError => "PermanentApiError",
            Self::InvalidResponse => "InvalidResponse",
            Self::InvalidRequest => "InvalidRequest",
            Self::Unclassified => "Unclassified",
        }
    }

    /// Map the upstream `human_review_reason` string.
    ///
    /// Returns `None` for reasons this controller does not recognise; callers
    /// fall back to [`SubReason::Unclassified`] and surface the raw string.
    pub fn from_review_reason(reason: &str) -> Option<Self> {
        match reason.trim().to_lowercase().as_str() {
            "no_matching_workflows" => Some(Self::NoMatchingWorkflows),
            "low_confidence" => Some(Self::LowConfidence),
            "llm_parsing_error" => Some(Self::LlmParsingError),
            "workflow_not_found" => Some(Self::WorkflowNotFound),
            "image_mismatch" => Some(Self::ImageMismatch),
            "parameter_validation_failed" => Some(Self::ParameterValidationFailed),
            "investigation_inconclusive" => Some(Self::InvestigationInconclusive),
            _ => None,
        }
    }
}

impl fmt::Display for SubReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a Kubernetes-style resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResource {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl TargetResource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

impl fmt::Display for TargetResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Cluster characteristics detected for the affected workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedLabels {
    /// Label detections that could not be completed.
    pub failed_detections: Vec<String>,
    pub git_ops_managed: bool,
    pub pdb_protected: bool,
    pub hpa_enabled: bool,
    pub stateful: bool,
    pub helm_managed: bool,
    pub network_isolated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_mesh: Option<String>,
}

/// Enrichment gathered before the analysis was requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentResults {
    /// Owner chain of the target resource, nearest owner first.
    pub owner_chain: Vec<TargetResource>,
    /// Operator-defined labels, key to values.
    pub custom_labels: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_labels: Option<DetectedLabels>,
}

/// Summary of an earlier remediation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviousExecution {
    pub workflow_id: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub failed_step: Option<String>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
}

/// Present when this analysis follows failed remediation attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryContext {
    /// 1-based number of this recovery attempt.
    pub attempt_number: u32,
    #[serde(default)]
    pub previous_executions: Vec<PreviousExecution>,
}

/// Immutable request captured at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Identifier of the remediation lifecycle; used as audit correlation ID.
    pub remediation_id: String,
    pub signal_fingerprint: String,
    pub severity: String,
    pub signal_name: String,
    pub signal_type: String,
    pub environment: String,
    pub business_priority: String,
    pub target_resource: TargetResource,
    #[serde(default)]
    pub enrichment: EnrichmentResults,
    #[serde(default)]
    pub analysis_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery: Option<RecoveryContext>,
}

impl AnalysisRequest {
    /// Check required fields before the resource is admitted.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let required = [
            ("remediation_id", &self.remediation_id),
            ("signal_fingerprint", &self.signal_fingerprint),
            ("signal_type", &self.signal_type),
            ("environment", &self.environment),
            ("target_resource.kind", &self.target_resource.kind),
            ("target_resource.name", &self.target_resource.name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AnalysisError::InvalidRequest(format!(
                    "{field} cannot be empty"
                )));
            }
        }
        if let Some(recovery) = &self.recovery {
            if recovery.attempt_number == 0 {
                return Err(AnalysisError::InvalidRequest(
                    "recovery.attempt_number must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_recovery(&self) -> bool {
        self.recovery.is_some()
    }

    pub fn recovery_attempt_number(&self) -> u32 {
        self.recovery.as_ref().map_or(0, |r| r.attempt_number)
    }
}

/// Handle to an investigation held by the external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationSession {
    pub id: String,
    /// Number of regenerations; never decreases, capped by configuration.
    pub generation: u32,
    /// Polls issued against the current session ID.
    pub poll_count: u32,
    pub created_at: DateTime<Utc>,
}

impl InvestigationSession {
    pub fn start(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            generation: 0,
            poll_count: 0,
            created_at: now,
        }
    }

    /// Replacement session after the previous one was forgotten upstream.
    pub fn regenerated(&self, id: impl Into<String>, generation: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            generation: generation.max(self.generation),
            poll_count: 0,
            created_at: now,
        }
    }

    pub fn record_poll(&mut self) {
        self.poll_count = self.poll_count.saturating_add(1);
    }
}

/// Workflow chosen by the investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedWorkflow {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Investigation confidence, within [0.0, 1.0].
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Candidate workflow offered when the investigation is not confident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeWorkflow {
    pub workflow_id: String,
    #[serde(default)]
    pub confidence: f64,
    pub rationale: String,
}

/// Root cause summary reported by the investigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootCause {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_resource: Option<TargetResource>,
}

/// Display classification of a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn classify(confidence: f64, thresholds: &ConfidenceThresholds) -> Self {
        if confidence >= thresholds.high_at_or_above {
            Self::High
        } else if confidence >= thresholds.low_below {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boundaries for [`ConfidenceLevel::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceThresholds {
    /// Scores below this are `low`.
    pub low_below: f64,
    /// Scores at or above this are `high`.
    pub high_at_or_above: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            low_below: 0.6,
            high_at_or_above: 0.8,
        }
    }
}

/// Why a human decision is (or is not) needed before remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalContext {
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub reason: String,
    /// Decision was made without a usable policy.
    pub degraded: bool,
    pub evaluated_at: DateTime<Utc>,
}

/// Context captured once the root cause is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRcaContext {
    pub detected_labels: DetectedLabels,
    /// Set exactly once; later reconciles never overwrite the context.
    pub set_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    InvestigationComplete,
    AnalysisComplete,
    WorkflowResolved,
    ApprovalRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: bool,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// Mutable status, written only by the reconciler through atomic updates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisStatus {
    pub phase: Phase,
    pub reason: Option<Reason>,
    pub sub_reason: Option<SubReason>,
    pub message: Option<String>,
    pub investigation_session: Option<InvestigationSession>,
    /// Highest session generation reached; kept if the session is cleared.
    pub session_generation: u32,
    pub investigation_id: Option<String>,
    pub selected_workflow: Option<SelectedWorkflow>,
    pub alternative_workflows: Vec<AlternativeWorkflow>,
    pub root_cause: Option<RootCause>,
    pub warnings: Vec<String>,
    pub target_in_owner_chain: Option<bool>,
    pub approval_required: bool,
    pub approval_context: Option<ApprovalContext>,
    pub needs_human_review: bool,
    pub human_review_reason: Option<String>,
    pub post_rca_context: Option<PostRcaContext>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds from start until the investigation result arrived.
    pub investigation_time_ms: Option<i64>,
    pub conditions: Vec<Condition>,
}

impl AnalysisStatus {
    /// Move to `next`, returning the previous phase.
    ///
    /// Entering a terminal phase stamps `completed_at` if it is not set.
    pub fn transition_to(&mut self, next: Phase, now: DateTime<Utc>) -> Result<Phase, AnalysisError> {
        let from = self.phase;
        if from.is_terminal() {
            return Err(AnalysisError::TerminalPhase(from));
        }
        if !from.can_transition_to(next) {
            return Err(AnalysisError::InvalidPhaseTransition { from, to: next });
        }
        self.phase = next;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(from)
    }

    /// Write-once setter for the post-RCA context. Returns false when
    /// the context was already present and has been left untouched.
    pub fn set_post_rca_context(&mut self, labels: DetectedLabels, now: DateTime<Utc>) -> bool {
        if self.post_rca_context.is_some() {
            return false;
        }
        self.post_rca_context = Some(PostRcaContext {
            detected_labels: labels,
            set_at: now,
        });
        true
    }

    /// Upsert a condition by type; the transition time only moves when
    /// the status flips.
    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let reason = reason.into();
        let message = message.into();
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            if existing.status != status {
                existing.last_transition_time = now;
            }
            existing.status = status;
            existing.reason = reason;
            existing.message = message;
            return;
        }
        self.conditions.push(Condition {
            condition_type,
            status,
            reason,
            message,
            last_transition_time: now,
        });
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// Resource metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    pub uid: Uuid,
    pub created_at: DateTime<Utc>,
    /// Bumped on every status write; used for optimistic concurrency.
    pub resource_version: u64,
}

/// An analysis resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AIAnalysis {
    pub metadata: ObjectMeta,
    pub spec: AnalysisRequest,
    #[serde(default)]
    pub status: AnalysisStatus,
}

impl AIAnalysis {
    pub fn new(key: ResourceKey, spec: AnalysisRequest) -> Self {
        Self {
            metadata: ObjectMeta {
                name: key.name,
                namespace: key.namespace,
                uid: Uuid::new_v4(),
                created_at: Utc::now(),
                resource_version: 1,
            },
            spec,
            status: AnalysisStatus::default(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Audit correlation ID: the remediation ID, or the UID when absent.
    pub fn correlation_id(&self) -> String {
        if self.spec.remediation_id.trim().is_empty() {
            self.metadata.uid.to_string()
        } else {
            self.spec.remediation_id.clone()
        }
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn request(signal_type: &str, environment: &str) -> AnalysisRequest {
        AnalysisRequest {
            remediation_id: format!("rr-{}", Uuid::new_v4()),
            signal_fingerprint: "fp-0001".to_string(),
            severity: "critical".to_string(),
            signal_name: "HighMemoryUsage".to_string(),
            signal_type: signal_type.to_string(),
            environment: environment.to_string(),
            business_priority: "P1".to_string(),
            target_resource: TargetResource::new("Pod", "api-7f9c").in_namespace("payments"),
            enrichment: EnrichmentResults::default(),
            analysis_types: vec!["investigation".to_string(), "workflow-selection".to_string()],
            recovery: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions_are_forward_only() {
        let phases = [
            Phase::Pending,
            Phase::Investigating,
            Phase::Analyzing,
            Phase::Completed,
            Phase::Failed,
        ];
        for from in phases {
            for to in from.valid_transitions() {
                assert!(to.ordinal() > from.ordinal(), "{from} -> {to} goes backwards");
            }
        }
        assert!(Phase::Completed.valid_transitions().is_empty());
        assert!(Phase::Failed.valid_transitions().is_empty());
    }

    #[test]
    fn test_transition_sets_completed_at_once() {
        let mut status = AnalysisStatus::default();
        let t0 = Utc::now();
        assert_eq!(status.transition_to(Phase::Investigating, t0).unwrap(), Phase::Pending);
        assert!(status.completed_at.is_none());
        status.transition_to(Phase::Analyzing, t0).unwrap();
        status.transition_to(Phase::Completed, t0).unwrap();
        assert_eq!(status.completed_at, Some(t0));

        let err = status.transition_to(Phase::Failed, Utc::now()).unwrap_err();
        assert_eq!(err, AnalysisError::TerminalPhase(Phase::Completed));
        assert_eq!(status.completed_at, Some(t0));
    }

    #[test]
    fn test_skipping_phases_is_rejected() {
        let mut status = AnalysisStatus::default();
        let err = status.transition_to(Phase::Analyzing, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidPhaseTransition {
                from: Phase::Pending,
                to: Phase::Analyzing
            }
        ));
        assert_eq!(status.phase, Phase::Pending);
    }

    #[test]
    fn test_post_rca_context_is_write_once() {
        let mut status = AnalysisStatus::default();
        let first = DetectedLabels {
            stateful: true,
            ..Default::default()
        };
        assert!(status.set_post_rca_context(first.clone(), Utc::now()));
        let set_at = status.post_rca_context.as_ref().unwrap().set_at;

        assert!(!status.set_post_rca_context(DetectedLabels::default(), Utc::now()));
        let ctx = status.post_rca_context.as_ref().unwrap();
        assert_eq!(ctx.detected_labels, first);
        assert_eq!(ctx.set_at, set_at);
    }

    #[test]
    fn test_confidence_classification_boundaries() {
        let t = ConfidenceThresholds::default();
        assert_eq!(ConfidenceLevel::classify(0.0, &t), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::classify(0.59, &t), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::classify(0.6, &t), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::classify(0.75, &t), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::classify(0.8, &t), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::classify(1.0, &t), ConfidenceLevel::High);
    }

    #[test]
    fn test_review_reason_mapping() {
        assert_eq!(
            SubReason::from_review_reason("no_matching_workflows"),
            Some(SubReason::NoMatchingWorkflows)
        );
        assert_eq!(
            SubReason::from_review_reason("LOW_CONFIDENCE"),
            Some(SubReason::LowConfidence)
        );
        assert_eq!(
            SubReason::from_review_reason("llm_parsing_error"),
            Some(SubReason::LlmParsingError)
        );
        assert_eq!(SubReason::from_review_reason("cosmic_rays"), None);
        assert_eq!(
            serde_json::to_string(&SubReason::LlmParsingError).unwrap(),
            "\"LLMParsingError\""
        );
    }

    #[test]
    fn test_condition_upsert() {
        let mut status = AnalysisStatus::default();
        let t0 = Utc::now();
        status.set_condition(ConditionType::ApprovalRequired, false, "AutoApproved", "ok", t0);
        let t1 = t0 + chrono::Duration::seconds(5);
        status.set_condition(ConditionType::ApprovalRequired, false, "AutoApproved", "still ok", t1);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, t0);

        status.set_condition(ConditionType::ApprovalRequired, true, "PolicyRequiresApproval", "prod", t1);
        let cond = status.condition(ConditionType::ApprovalRequired).unwrap();
        assert!(cond.status);
        assert_eq!(cond.last_transition_time, t1);
    }

    #[test]
    fn test_request_validation() {
        let mut req = fixtures::request("OOMKilled", "production");
        assert!(req.validate().is_ok());

        req.environment = "  ".to_string();
        assert!(matches!(req.validate(), Err(AnalysisError::InvalidRequest(_))));

        let mut req = fixtures::request("OOMKilled", "production");
        req.recovery = Some(RecoveryContext {
            attempt_number: 0,
            previous_executions: vec![],
        });
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_resource_key_parse() {
        assert_eq!(ResourceKey::parse("ns/a"), Some(ResourceKey::new("ns", "a")));
        assert_eq!(ResourceKey::parse("a"), Some(ResourceKey::new("default", "a")));
        assert_eq!(ResourceKey::parse("/a"), None);
        assert_eq!(ResourceKey::parse(""), None);
        assert_eq!(ResourceKey::new("ns", "a").to_string(), "ns/a");
    }

    #[test]
    fn test_session_regeneration_never_lowers_generation() {
        let now = Utc::now();
        let mut session = InvestigationSession::start("s-1", now);
        session.record_poll();
        session.record_poll();
        let next = session.regenerated("s-2", 1, now);
        assert_eq!(next.generation, 1);
        assert_eq!(next.poll_count, 0);
        let stale = next.regenerated("s-3", 0, now);
        assert_eq!(stale.generation, 1);
    }
}
