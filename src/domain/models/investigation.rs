//! Wire model for the external investigation service.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::analysis::{
    AIAnalysis, AlternativeWorkflow, DetectedLabels, EnrichmentResults, PreviousExecution,
    RootCause, TargetResource,
};

/// Investigation request built from an analysis spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationRequest {
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
}

impl InvestigationRequest {
    pub fn from_analysis(analysis: &AIAnalysis) -> Self {
        let spec = &analysis.spec;
        Self {
            remediation_id: analysis.correlation_id(),
            signal_fingerprint: spec.signal_fingerprint.clone(),
            severity: spec.severity.clone(),
            signal_name: spec.signal_name.clone(),
            signal_type: spec.signal_type.clone(),
            environment: spec.environment.clone(),
            business_priority: spec.business_priority.clone(),
            target_resource: spec.target_resource.clone(),
            enrichment: spec.enrichment.clone(),
            analysis_types: spec.analysis_types.clone(),
        }
    }
}

/// Recovery variant: carries the history of failed attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRequest {
    #[serde(flatten)]
    pub investigation: InvestigationRequest,
    pub recovery_attempt_number: u32,
    pub previous_executions: Vec<PreviousExecution>,
}

impl RecoveryRequest {
    /// Returns `None` when the analysis is not a recovery attempt.
    pub fn from_analysis(analysis: &AIAnalysis) -> Option<Self> {
        let recovery = analysis.spec.recovery.as_ref()?;
        Some(Self {
            investigation: InvestigationRequest::from_analysis(analysis),
            recovery_attempt_number: recovery.attempt_number,
            previous_executions: recovery.previous_executions.clone(),
        })
    }
}

/// Workflow recommended by the investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecommendation {
    pub workflow_id: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub rationale: String,
}

/// Terminal payload of an investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResult {
    #[serde(default)]
    pub investigation_id: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub selected_workflow: Option<WorkflowRecommendation>,
    #[serde(default)]
    pub alternative_workflows: Vec<AlternativeWorkflow>,
    #[serde(default)]
    pub root_cause: Option<RootCause>,
    #[serde(default)]
    pub needs_human_review: bool,
    #[serde(default)]
    pub human_review_reason: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub target_in_owner_chain: Option<bool>,
    #[serde(default)]
    pub detected_labels: Option<DetectedLabels>,
    /// The investigation found the problem already resolved.
    #[serde(default)]
    pub problem_resolved: bool,
}

impl InvestigationResult {
    pub fn confidence_is_valid(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }

    pub fn affected_resource(&self) -> Option<&TargetResource> {
        self.root_cause.as_ref()?.affected_resource.as_ref()
    }
}

/// Response to a submit call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Investigation accepted; poll with this session ID.
    Session(String),
    /// Investigation finished synchronously.
    Completed(Box<InvestigationResult>),
}

/// Response to a poll call.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Still running.
    Pending,
    Completed(Box<InvestigationResult>),
    /// The service no longer knows this session.
    SessionNotFound,
}
