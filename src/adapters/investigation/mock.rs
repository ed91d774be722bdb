//! Scripted investigation service for tests and `--mock` runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::models::{
    AlternativeWorkflow, InvestigationRequest, InvestigationResult, PollOutcome, RecoveryRequest,
    RootCause, SubmitOutcome, WorkflowRecommendation,
};
use crate::domain::ports::{InvestigationClient, InvestigationError};

/// Signal type answered with `no_matching_workflows`.
pub const MOCK_NO_WORKFLOW_FOUND: &str = "MOCK_NO_WORKFLOW_FOUND";
/// Signal type answered with a 0.35 confidence recommendation and alternatives.
pub const MOCK_LOW_CONFIDENCE: &str = "MOCK_LOW_CONFIDENCE";
/// Signal type answered with "problem resolved".
pub const MOCK_PROBLEM_RESOLVED: &str = "MOCK_PROBLEM_RESOLVED";
/// Signal type answered with `llm_parsing_error`.
pub const MOCK_LLM_PARSING_ERROR: &str = "MOCK_LLM_PARSING_ERROR";

/// How the mock answers a given signal type.
#[derive(Debug, Clone)]
pub enum MockScenario {
    /// Recommend a workflow at the given confidence
    Recommend { workflow_id: String, confidence: f64 },
    /// Recommend a workflow with low confidence plus two alternatives
    LowConfidence { confidence: f64 },
    /// Ask for human review with the given upstream reason
    HumanReview { reason: String },
    /// The problem is already gone
    ProblemResolved,
    /// Reject the submit with a client error
    Reject { status: u16, message: String },
    /// Return this exact result
    Result(Box<InvestigationResult>),
}

impl MockScenario {
    fn for_signal(signal_type: &str) -> Self {
        match signal_type {
            MOCK_NO_WORKFLOW_FOUND => Self::HumanReview {
                reason: "no_matching_workflows".to_string(),
            },
            MOCK_LOW_CONFIDENCE => Self::LowConfidence { confidence: 0.35 },
            MOCK_PROBLEM_RESOLVED => Self::ProblemResolved,
            MOCK_LLM_PARSING_ERROR => Self::HumanReview {
                reason: "llm_parsing_error".to_string(),
            },
            other => Self::Recommend {
                workflow_id: format!("{}-remediation", other.to_lowercase()),
                confidence: 0.85,
            },
        }
    }

    fn build(&self, request: &InvestigationRequest) -> Result<InvestigationResult, InvestigationError> {
        let root_cause = RootCause {
            summary: format!("{} on {}", request.signal_name, request.target_resource),
            severity: Some(request.severity.clone()),
            contributing_factors: Vec::new(),
            affected_resource: Some(request.target_resource.clone()),
        };
        let mut result = InvestigationResult {
            investigation_id: Some(format!("inv-{}", Uuid::new_v4())),
            confidence: 0.0,
            selected_workflow: None,
            alternative_workflows: Vec::new(),
            root_cause: Some(root_cause),
            needs_human_review: false,
            human_review_reason: None,
            warnings: Vec::new(),
            target_in_owner_chain: Some(true),
            detected_labels: request.enrichment.detected_labels.clone(),
            problem_resolved: false,
        };

        match self {
            Self::Recommend {
                workflow_id,
                confidence,
            } => {
                result.confidence = *confidence;
                result.selected_workflow = Some(recommendation(workflow_id));
            }
            Self::LowConfidence { confidence } => {
                result.confidence = *confidence;
                result.selected_workflow = Some(recommendation("generic-restart"));
                result.alternative_workflows = vec![
                    AlternativeWorkflow {
                        workflow_id: "scale-out-replicas".to_string(),
                        confidence: 0.30,
                        rationale: "Load pattern partially matches capacity exhaustion"
                            .to_string(),
                    },
                    AlternativeWorkflow {
                        workflow_id: "rollback-deployment".to_string(),
                        confidence: 0.25,
                        rationale: "A recent rollout may have introduced the regression"
                            .to_string(),
                    },
                ];
            }
            Self::HumanReview { reason } => {
                result.needs_human_review = true;
                result.human_review_reason = Some(reason.clone());
            }
            Self::ProblemResolved => {
                result.confidence = 0.9;
                result.problem_resolved = true;
            }
            Self::Reject { status, message } => {
                return Err(InvestigationError::Rejected {
                    status: *status,
                    message: message.clone(),
                })
            }
            Self::Result(fixed) => return Ok((**fixed).clone()),
        }
        Ok(result)
    }
}

fn recommendation(workflow_id: &str) -> WorkflowRecommendation {
    WorkflowRecommendation {
        workflow_id: workflow_id.to_string(),
        version: Some("v1".to_string()),
        container_image: Some(format!("registry.local/workflows/{workflow_id}:v1")),
        parameters: std::collections::BTreeMap::new(),
        rationale: format!("{workflow_id} matches the observed failure pattern"),
    }
}

#[derive(Debug, Clone)]
struct MockSession {
    request: InvestigationRequest,
    polls: u32,
}

/// Scripted [`InvestigationClient`].
///
/// Submits open a session that completes after `polls_before_complete`
/// pending polls. Stale sessions and transient submit or poll failures can
/// be forced to exercise regeneration and requeue paths.
pub struct MockInvestigationClient {
    sessions: Arc<RwLock<HashMap<String, MockSession>>>,
    scenarios: Arc<RwLock<HashMap<String, MockScenario>>>,
    polls_before_complete: u32,
    synchronous: bool,
    forced_stale: AtomicU32,
    forced_transient: AtomicU32,
    forced_submit_transient: AtomicU32,
    submits: AtomicU32,
    recovery_submits: AtomicU32,
    polls: AtomicU32,
}

impl MockInvestigationClient {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            scenarios: Arc::new(RwLock::new(HashMap::new())),
            polls_before_complete: 0,
            synchronous: false,
            forced_stale: AtomicU32::new(0),
            forced_transient: AtomicU32::new(0),
            forced_submit_transient: AtomicU32::new(0),
            submits: AtomicU32::new(0),
            recovery_submits: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        }
    }

    /// Answer submits directly instead of opening a session.
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    /// Number of `Pending` polls before a session completes.
    pub fn with_polls_before_complete(mut self, polls: u32) -> Self {
        self.polls_before_complete = polls;
        self
    }

    /// Script the answer for a signal type.
    pub async fn set_scenario(&self, signal_type: impl Into<String>, scenario: MockScenario) {
        self.scenarios
            .write()
            .await
            .insert(signal_type.into(), scenario);
    }

    /// The next `n` polls report the session as unknown.
    pub fn force_stale_sessions(&self, n: u32) {
        self.forced_stale.store(n, Ordering::SeqCst);
    }

    /// The next `n` polls fail with a timeout.
    pub fn force_transient_failures(&self, n: u32) {
        self.forced_transient.store(n, Ordering::SeqCst);
    }

    /// The next `n` submits, regular or recovery, fail with a timeout.
    pub fn force_transient_submit_failures(&self, n: u32) {
        self.forced_submit_transient.store(n, Ordering::SeqCst);
    }

    pub fn submit_count(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn recovery_submit_count(&self) -> u32 {
        self.recovery_submits.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    async fn scenario_for(&self, signal_type: &str) -> MockScenario {
        self.scenarios
            .read()
            .await
            .get(signal_type)
            .cloned()
            .unwrap_or_else(|| MockScenario::for_signal(signal_type))
    }

    async fn open(&self, request: &InvestigationRequest) -> Result<SubmitOutcome, InvestigationError> {
        if take_one(&self.forced_submit_transient) {
            return Err(InvestigationError::Timeout);
        }
        let scenario = self.scenario_for(&request.signal_type).await;
        if let MockScenario::Reject { status, message } = &scenario {
            return Err(InvestigationError::Rejected {
                status: *status,
                message: message.clone(),
            });
        }
        if self.synchronous {
            return Ok(SubmitOutcome::Completed(Box::new(scenario.build(request)?)));
        }

        let session_id = format!("mock-session-{}", Uuid::new_v4());
        self.sessions.write().await.insert(
            session_id.clone(),
            MockSession {
                request: request.clone(),
                polls: 0,
            },
        );
        Ok(SubmitOutcome::Session(session_id))
    }
}

impl Default for MockInvestigationClient {
    fn default() -> Self {
        Self::new()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl InvestigationClient for MockInvestigationClient {
    async fn submit(
        &self,
        request: &InvestigationRequest,
    ) -> Result<SubmitOutcome, InvestigationError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.open(request).await
    }

    async fn submit_recovery(
        &self,
        request: &RecoveryRequest,
    ) -> Result<SubmitOutcome, InvestigationError> {
        self.recovery_submits.fetch_add(1, Ordering::SeqCst);
        self.open(&request.investigation).await
    }

    async fn poll(
        &self,
        session_id: &str,
        _correlation_id: &str,
    ) -> Result<PollOutcome, InvestigationError> {
        self.polls.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.forced_transient) {
            return Err(InvestigationError::Timeout);
        }
        if take_one(&self.forced_stale) {
            self.sessions.write().await.remove(session_id);
            return Ok(PollOutcome::SessionNotFound);
        }

        let request = {
            let mut sessions = self.sessions.write().await;
            let Some(session) = sessions.get_mut(session_id) else {
                return Ok(PollOutcome::SessionNotFound);
            };
            if session.polls < self.polls_before_complete {
                session.polls += 1;
                return Ok(PollOutcome::Pending);
            }
            session.request.clone()
        };

        let scenario = self.scenario_for(&request.signal_type).await;
        Ok(PollOutcome::Completed(Box::new(scenario.build(&request)?)))
    }
}
