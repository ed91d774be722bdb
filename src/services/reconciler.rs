//! Analysis reconciliation state machine.
//!
//! Each call to [`AnalysisReconciler::reconcile`] reads the resource,
//! performs at most one step of the lifecycle and writes the status back
//! through the repository's optimistic-concurrency check. Audit records and
//! resource events describing a status change are queued while the new
//! status is computed and only emitted once the write has committed, so a
//! conflicting write never leaves a trail for a change that did not happen.
//!
//! Calls to the investigation service and transient errors are audited
//! when they happen, whether or not the status write that follows lands.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{
    AIAnalysis, AnalysisStatus, ApprovalContext, Config, ConditionType, ConfidenceLevel,
    ConfidenceThresholds, EventReason, InvestigationCallData, InvestigationOperation,
    InvestigationRequest, InvestigationResult, InvestigationSession, Phase, PolicyDecision,
    PolicyInput, PollOutcome, Reason, RecoveryRequest, ResourceEvent, ResourceKey,
    SelectedWorkflow, SessionAction, SubReason, SubmitOutcome,
};
use crate::domain::ports::{
    AnalysisRepository, EventRecorder, InvestigationClient, InvestigationError, PolicyEvaluator,
    RepositoryError,
};
use crate::domain::AnalysisError;
use crate::services::audit_emitter::AuditEmitter;
use crate::services::session::{SessionDecision, SessionTracker};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Selected workflows below this confidence fail the analysis
    pub min_confidence: f64,
    pub confidence_thresholds: ConfidenceThresholds,
    /// Requeue delay while an investigation session is open
    pub poll_interval: Duration,
    pub max_session_regenerations: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReconcilerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_confidence: config.analysis.min_confidence,
            confidence_thresholds: config.analysis.confidence_levels,
            poll_interval: Duration::from_millis(config.investigation.poll_interval_ms),
            max_session_regenerations: config.investigation.max_session_regenerations,
        }
    }
}

/// What the scheduler should do with the key after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing further until the resource changes.
    Done,
    /// Reconcile again after the delay.
    Requeue(Duration),
}

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Investigation error: {0}")]
    Investigation(#[from] InvestigationError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl ReconcileError {
    /// Whether requeueing with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repository(err) => err.is_transient(),
            Self::Investigation(err) => err.is_transient(),
            Self::Analysis(_) => false,
        }
    }
}

/// Audit work that needs the committed status.
enum AuditEffect {
    Transition {
        old_phase: Phase,
        new_phase: Phase,
        reason: Option<String>,
    },
    Session {
        action: SessionAction,
        session: InvestigationSession,
    },
    Policy {
        input: PolicyInput,
        decision: PolicyDecision,
    },
    ApprovalDecision,
    Completed,
    Failed { failed_phase: Phase },
}

#[derive(Default)]
struct Effects {
    audit: Vec<AuditEffect>,
    events: Vec<(EventReason, String)>,
}

impl Effects {
    fn event(&mut self, reason: EventReason, message: impl Into<String>) {
        self.events.push((reason, message.into()));
    }

    fn transition(&mut self, old_phase: Phase, new_phase: Phase, reason: Option<String>) {
        self.audit.push(AuditEffect::Transition {
            old_phase,
            new_phase,
            reason,
        });
    }

    fn session(&mut self, action: SessionAction, session: &InvestigationSession) {
        self.audit.push(AuditEffect::Session {
            action,
            session: session.clone(),
        });
    }
}

struct Failure {
    reason: Reason,
    sub_reason: SubReason,
    message: String,
    needs_human_review: bool,
}

impl Failure {
    fn new(reason: Reason, sub_reason: SubReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            sub_reason,
            message: message.into(),
            needs_human_review: false,
        }
    }

    fn for_review(mut self) -> Self {
        self.needs_human_review = true;
        self
    }

    fn from_investigation_error(err: &InvestigationError) -> Self {
        let sub_reason = match err {
            InvestigationError::InvalidResponse(_) => SubReason::InvalidResponse,
            _ => SubReason::PermanentApiError,
        };
        Self::new(Reason::InvestigationFailed, sub_reason, err.to_string())
    }
}

pub struct AnalysisReconciler {
    repository: Arc<dyn AnalysisRepository>,
    investigation: Arc<dyn InvestigationClient>,
    policy: Arc<dyn PolicyEvaluator>,
    audit: AuditEmitter,
    events: Arc<dyn EventRecorder>,
    sessions: SessionTracker,
    config: ReconcilerConfig,
}

impl AnalysisReconciler {
    pub fn new(
        repository: Arc<dyn AnalysisRepository>,
        investigation: Arc<dyn InvestigationClient>,
        policy: Arc<dyn PolicyEvaluator>,
        audit: AuditEmitter,
        events: Arc<dyn EventRecorder>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            repository,
            investigation,
            policy,
            audit,
            events,
            sessions: SessionTracker::new(config.max_session_regenerations),
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Drive the analysis one step forward.
    ///
    /// Terminal analyses and deleted keys are no-ops. Transient collaborator
    /// errors leave the status untouched and are returned for the scheduler
    /// to retry; permanent ones fail the analysis.
    #[instrument(skip_all, fields(namespace = %key.namespace, name = %key.name))]
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(mut analysis) = self.repository.get(key).await? else {
            debug!("analysis no longer exists");
            return Ok(ReconcileOutcome::Done);
        };

        match analysis.phase() {
            Phase::Pending => self.reconcile_pending(&mut analysis).await,
            Phase::Investigating => self.reconcile_investigating(&mut analysis).await,
            Phase::Analyzing => self.reconcile_analyzing(&mut analysis).await,
            Phase::Completed | Phase::Failed => {
                debug!(phase = %analysis.phase(), "analysis is terminal");
                Ok(ReconcileOutcome::Done)
            }
        }
    }

    async fn reconcile_pending(
        &self,
        analysis: &mut AIAnalysis,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let now = Utc::now();

        if let Err(err) = analysis.spec.validate() {
            warn!(error = %err, "rejecting invalid analysis request");
            let mut status = analysis.status.clone();
            status.started_at.get_or_insert(now);
            let failure = Failure::new(
                Reason::InvestigationFailed,
                SubReason::InvalidRequest,
                err.to_string(),
            );
            return self
                .fail(analysis, status, failure, Effects::default(), now)
                .await;
        }

        let submitted = match self.submit(analysis).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_transient() => return Err(self.transient(analysis, "submit", err)),
            Err(err) => {
                warn!(error = %err, "investigation submit rejected");
                let mut status = analysis.status.clone();
                status.started_at.get_or_insert(now);
                let mut effects = Effects::default();
                effects.event(
                    EventReason::AIAnalysisCreated,
                    "Analysis accepted for investigation",
                );
                return self
                    .fail(
                        analysis,
                        status,
                        Failure::from_investigation_error(&err),
                        effects,
                        now,
                    )
                    .await;
            }
        };

        let mut status = analysis.status.clone();
        let from = status.transition_to(Phase::Investigating, now)?;
        status.started_at = Some(now);

        let mut effects = Effects::default();
        effects.transition(from, Phase::Investigating, None);
        effects.event(
            EventReason::AIAnalysisCreated,
            "Analysis accepted for investigation",
        );

        match submitted {
            SubmitOutcome::Session(session_id) => {
                let session = InvestigationSession::start(&session_id, now);
                effects.session(SessionAction::Created, &session);
                effects.event(
                    EventReason::SessionCreated,
                    format!("Investigation session {session_id} created"),
                );
                status.message = Some(format!("Investigating in session {session_id}"));
                status.investigation_session = Some(session);
                self.commit(analysis, status, effects).await?;
                info!(session_id = %session_id, "investigation started");
                Ok(ReconcileOutcome::Requeue(self.config.poll_interval))
            }
            SubmitOutcome::Completed(result) => {
                status.message = Some("Investigation answered synchronously".to_string());
                self.commit(analysis, status, effects).await?;
                self.apply_result(analysis, *result, Effects::default()).await
            }
        }
    }

    async fn reconcile_investigating(
        &self,
        analysis: &mut AIAnalysis,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(session) = analysis.status.investigation_session.clone() else {
            let generation = analysis.status.session_generation;
            warn!(generation, "investigating without a session, opening a new one");
            return self
                .open_replacement(analysis, None, generation, Effects::default())
                .await;
        };

        let started = Instant::now();
        let polled = self
            .investigation
            .poll(&session.id, &analysis.correlation_id())
            .await;
        self.audit.investigation_call(
            analysis,
            InvestigationCallData {
                operation: InvestigationOperation::Poll,
                session_id: Some(session.id.clone()),
                duration_ms: elapsed_ms(started),
                result: match &polled {
                    Ok(PollOutcome::Pending) => "pending",
                    Ok(PollOutcome::Completed(_)) => "completed",
                    Ok(PollOutcome::SessionNotFound) => "session_not_found",
                    Err(_) => "error",
                }
                .to_string(),
                error: polled.as_ref().err().map(ToString::to_string),
            },
        );

        match polled {
            Ok(PollOutcome::Pending) => {
                let mut status = analysis.status.clone();
                if let Some(session) = status.investigation_session.as_mut() {
                    session.record_poll();
                }
                self.commit(analysis, status, Effects::default()).await?;
                debug!(session_id = %session.id, "investigation still running");
                Ok(ReconcileOutcome::Requeue(self.config.poll_interval))
            }
            Ok(PollOutcome::Completed(result)) => {
                if let Some(session) = analysis.status.investigation_session.as_mut() {
                    session.record_poll();
                }
                self.apply_result(analysis, *result, Effects::default()).await
            }
            Ok(PollOutcome::SessionNotFound) => self.session_lost(analysis, session).await,
            Err(err) if err.is_transient() => Err(self.transient(analysis, "poll", err)),
            Err(err) => {
                warn!(error = %err, session_id = %session.id, "investigation poll failed permanently");
                let status = analysis.status.clone();
                self.fail(
                    analysis,
                    status,
                    Failure::from_investigation_error(&err),
                    Effects::default(),
                    Utc::now(),
                )
                .await
            }
        }
    }

    async fn session_lost(
        &self,
        analysis: &mut AIAnalysis,
        lost: InvestigationSession,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        warn!(
            session_id = %lost.id,
            generation = lost.generation,
            remaining = self.sessions.remaining(&lost),
            poll_count = lost.poll_count,
            "investigation session lost"
        );
        let mut effects = Effects::default();
        effects.session(SessionAction::Lost, &lost);
        effects.event(
            EventReason::SessionLost,
            format!(
                "Investigation session {} lost (generation {})",
                lost.id, lost.generation
            ),
        );

        match self.sessions.on_session_lost(&lost) {
            SessionDecision::Regenerate { generation } => {
                self.open_replacement(analysis, Some(lost), generation, effects)
                    .await
            }
            SessionDecision::Exhausted { generation } => {
                let max = self.sessions.max_regenerations();
                effects.session(SessionAction::RegenerationExceeded, &lost);
                effects.event(
                    EventReason::SessionRegenerationExceeded,
                    format!("Session regeneration limit reached ({generation}/{max})"),
                );
                let status = analysis.status.clone();
                let failure = Failure::new(
                    Reason::WorkflowResolutionFailed,
                    SubReason::SessionRegenerationExceeded,
                    format!(
                        "Investigation session was lost {} times; regeneration limit of {max} exceeded",
                        generation + 1
                    ),
                )
                .for_review();
                self.fail(analysis, status, failure, effects, Utc::now())
                    .await
            }
        }
    }

    /// Submit again after a lost (or missing) session.
    async fn open_replacement(
        &self,
        analysis: &mut AIAnalysis,
        lost: Option<InvestigationSession>,
        generation: u32,
        mut effects: Effects,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let submitted = match self.submit(analysis).await {
            Ok(outcome) => outcome,
            // The loss is still on record; the next poll reports it again.
            Err(err) if err.is_transient() => return Err(self.transient(analysis, "submit", err)),
            Err(err) => {
                let status = analysis.status.clone();
                return self
                    .fail(
                        analysis,
                        status,
                        Failure::from_investigation_error(&err),
                        effects,
                        Utc::now(),
                    )
                    .await;
            }
        };

        let now = Utc::now();
        let mut status = analysis.status.clone();
        match submitted {
            SubmitOutcome::Session(session_id) => {
                let session = match &lost {
                    Some(lost) => lost.regenerated(&session_id, generation, now),
                    None => InvestigationSession {
                        generation,
                        ..InvestigationSession::start(&session_id, now)
                    },
                };
                effects.session(SessionAction::Created, &session);
                effects.event(
                    EventReason::SessionCreated,
                    format!(
                        "Investigation session {session_id} created (generation {})",
                        session.generation
                    ),
                );
                info!(
                    session_id = %session_id,
                    generation = session.generation,
                    "investigation session regenerated"
                );
                status.message = Some(format!(
                    "Investigating in session {session_id} (generation {})",
                    session.generation
                ));
                status.investigation_session = Some(session);
                self.commit(analysis, status, effects).await?;
                Ok(ReconcileOutcome::Requeue(self.config.poll_interval))
            }
            SubmitOutcome::Completed(result) => {
                // Answered synchronously: no new session to track, only the
                // spent generation.
                if let Some(lost) = &lost {
                    status.investigation_session =
                        Some(lost.regenerated(lost.id.clone(), generation, now));
                }
                analysis.status = status;
                self.apply_result(analysis, *result, effects).await
            }
        }
    }

    /// Record a terminal investigation result and route it.
    async fn apply_result(
        &self,
        analysis: &mut AIAnalysis,
        result: InvestigationResult,
        mut effects: Effects,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let now = Utc::now();
        let mut status = analysis.status.clone();

        status.investigation_id.clone_from(&result.investigation_id);
        status.root_cause.clone_from(&result.root_cause);
        status.warnings.clone_from(&result.warnings);
        status.target_in_owner_chain = result.target_in_owner_chain;
        status.alternative_workflows.clone_from(&result.alternative_workflows);
        status.investigation_time_ms = status
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0));
        if let Some(labels) = result.detected_labels.clone() {
            if !status.set_post_rca_context(labels, now) {
                debug!("post-RCA context already set, keeping original");
            }
        }
        status.set_condition(
            ConditionType::InvestigationComplete,
            true,
            "InvestigationSucceeded",
            format!("Investigation finished with confidence {:.2}", result.confidence),
            now,
        );
        effects.event(
            EventReason::InvestigationComplete,
            format!("Investigation completed with confidence {:.2}", result.confidence),
        );

        if !result.confidence_is_valid() {
            let failure = Failure::new(
                Reason::InvestigationFailed,
                SubReason::InvalidResponse,
                format!(
                    "Investigation returned confidence {} outside 0.0-1.0",
                    result.confidence
                ),
            )
            .for_review();
            return self.fail(analysis, status, failure, effects, now).await;
        }

        if result.problem_resolved {
            let from = status.transition_to(Phase::Completed, now)?;
            status.reason = Some(Reason::WorkflowNotNeeded);
            status.sub_reason = Some(SubReason::ProblemResolved);
            status.selected_workflow = None;
            status.alternative_workflows.clear();
            status.approval_required = false;
            status.message = Some("Problem resolved; no remediation needed".to_string());
            status.set_condition(
                ConditionType::WorkflowResolved,
                false,
                "WorkflowNotNeeded",
                "No remediation workflow is needed",
                now,
            );
            status.set_condition(
                ConditionType::AnalysisComplete,
                true,
                "ProblemResolved",
                "Investigation found the problem already resolved",
                now,
            );
            effects.transition(from, Phase::Completed, Some("ProblemResolved".to_string()));
            effects.audit.push(AuditEffect::Completed);
            effects.event(
                EventReason::AnalysisCompleted,
                "Problem resolved; no remediation needed",
            );
            self.commit(analysis, status, effects).await?;
            info!("analysis completed: problem resolved");
            return Ok(ReconcileOutcome::Done);
        }

        if result.needs_human_review {
            let raw = result
                .human_review_reason
                .clone()
                .unwrap_or_else(|| "unspecified".to_string());
            let sub_reason = SubReason::from_review_reason(&raw).unwrap_or_else(|| {
                warn!(human_review_reason = %raw, "unrecognised human review reason");
                SubReason::Unclassified
            });
            let message = format!("Investigation requires human review: {raw}");
            status.human_review_reason = Some(raw);
            effects.event(EventReason::HumanReviewRequired, message.clone());
            let failure =
                Failure::new(Reason::WorkflowResolutionFailed, sub_reason, message).for_review();
            return self.fail(analysis, status, failure, effects, now).await;
        }

        let Some(recommendation) = result.selected_workflow else {
            let failure = Failure::new(
                Reason::WorkflowResolutionFailed,
                SubReason::NoMatchingWorkflows,
                "Investigation did not select a workflow",
            )
            .for_review();
            return self.fail(analysis, status, failure, effects, now).await;
        };

        if result.confidence >= self.config.min_confidence {
            status.alternative_workflows.clear();
        }
        let message = format!(
            "Workflow {} selected with confidence {:.2}",
            recommendation.workflow_id, result.confidence
        );
        status.selected_workflow = Some(SelectedWorkflow {
            workflow_id: recommendation.workflow_id,
            version: recommendation.version,
            container_image: recommendation.container_image,
            parameters: recommendation.parameters,
            confidence: result.confidence,
            rationale: recommendation.rationale,
        });
        let from = status.transition_to(Phase::Analyzing, now)?;
        status.set_condition(
            ConditionType::WorkflowResolved,
            true,
            "WorkflowSelected",
            message.clone(),
            now,
        );
        status.message = Some(message);
        effects.transition(from, Phase::Analyzing, None);

        self.commit(analysis, status, effects).await?;
        Ok(ReconcileOutcome::Requeue(Duration::ZERO))
    }

    async fn reconcile_analyzing(
        &self,
        analysis: &mut AIAnalysis,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let now = Utc::now();
        let mut status = analysis.status.clone();

        let Some(selected) = status.selected_workflow.clone() else {
            let failure = Failure::new(
                Reason::WorkflowResolutionFailed,
                SubReason::NoMatchingWorkflows,
                "No workflow selected for analysis",
            )
            .for_review();
            return self
                .fail(analysis, status, failure, Effects::default(), now)
                .await;
        };

        if selected.confidence < self.config.min_confidence {
            status.human_review_reason = Some("low_confidence".to_string());
            let failure = Failure::new(
                Reason::WorkflowResolutionFailed,
                SubReason::LowConfidence,
                format!(
                    "Confidence {:.2} is below the minimum {:.2}; {} alternative workflow(s) available for review",
                    selected.confidence,
                    self.config.min_confidence,
                    status.alternative_workflows.len()
                ),
            )
            .for_review();
            return self
                .fail(analysis, status, failure, Effects::default(), now)
                .await;
        }

        let input = policy_input(analysis, &selected);
        let decision = self.policy.evaluate(&input);
        if decision.degraded {
            warn!(reason = %decision.reason, "approval policy degraded, approval required");
        }

        let level = ConfidenceLevel::classify(selected.confidence, &self.config.confidence_thresholds);
        status.approval_required = decision.approval_required;
        status.approval_context = Some(ApprovalContext {
            confidence_score: selected.confidence,
            confidence_level: level,
            reason: decision.reason.clone(),
            degraded: decision.degraded,
            evaluated_at: now,
        });
        status.set_condition(
            ConditionType::ApprovalRequired,
            decision.approval_required,
            if decision.approval_required {
                "ApprovalRequired"
            } else {
                "AutoApproved"
            },
            decision.reason.clone(),
            now,
        );

        let from = status.transition_to(Phase::Completed, now)?;
        status.reason = Some(Reason::AnalysisCompleted);
        status.sub_reason = None;
        let message = if decision.approval_required {
            format!(
                "Workflow {} selected ({} confidence); approval required: {}",
                selected.workflow_id, level, decision.reason
            )
        } else {
            format!(
                "Workflow {} selected ({} confidence); auto-approved",
                selected.workflow_id, level
            )
        };
        status.set_condition(
            ConditionType::AnalysisComplete,
            true,
            "AnalysisCompleted",
            message.clone(),
            now,
        );
        status.message = Some(message.clone());

        let mut effects = Effects::default();
        effects.audit.push(AuditEffect::Policy {
            input,
            decision: decision.clone(),
        });
        effects.audit.push(AuditEffect::ApprovalDecision);
        effects.transition(from, Phase::Completed, None);
        effects.audit.push(AuditEffect::Completed);
        effects.event(EventReason::AnalysisCompleted, message);

        self.commit(analysis, status, effects).await?;
        info!(
            workflow_id = %selected.workflow_id,
            confidence = selected.confidence,
            approval_required = decision.approval_required,
            "analysis completed"
        );
        Ok(ReconcileOutcome::Done)
    }

    async fn submit(&self, analysis: &AIAnalysis) -> Result<SubmitOutcome, InvestigationError> {
        let started = Instant::now();
        let (operation, result) = match RecoveryRequest::from_analysis(analysis) {
            Some(request) => (
                InvestigationOperation::SubmitRecovery,
                self.investigation.submit_recovery(&request).await,
            ),
            None => (
                InvestigationOperation::Submit,
                self.investigation
                    .submit(&InvestigationRequest::from_analysis(analysis))
                    .await,
            ),
        };

        self.audit.investigation_call(
            analysis,
            InvestigationCallData {
                operation,
                session_id: match &result {
                    Ok(SubmitOutcome::Session(id)) => Some(id.clone()),
                    _ => None,
                },
                duration_ms: elapsed_ms(started),
                result: match &result {
                    Ok(SubmitOutcome::Session(_)) => "accepted",
                    Ok(SubmitOutcome::Completed(_)) => "completed",
                    Err(_) => "error",
                }
                .to_string(),
                error: result.as_ref().err().map(ToString::to_string),
            },
        );
        result
    }

    /// Audit a transient error and hand it back for requeue.
    fn transient(
        &self,
        analysis: &AIAnalysis,
        operation: &str,
        err: InvestigationError,
    ) -> ReconcileError {
        warn!(operation, error = %err, "transient investigation error, will retry");
        self.audit
            .error_occurred(analysis, operation, &err.to_string(), true);
        ReconcileError::Investigation(err)
    }

    async fn fail(
        &self,
        analysis: &mut AIAnalysis,
        mut status: AnalysisStatus,
        failure: Failure,
        mut effects: Effects,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let from = status.transition_to(Phase::Failed, now)?;
        status.reason = Some(failure.reason);
        status.sub_reason = Some(failure.sub_reason);
        status.needs_human_review |= failure.needs_human_review;
        status.approval_required = false;
        status.set_condition(
            ConditionType::AnalysisComplete,
            false,
            failure.sub_reason.as_str(),
            failure.message.clone(),
            now,
        );
        status.message = Some(failure.message.clone());

        effects.transition(
            from,
            Phase::Failed,
            Some(failure.sub_reason.as_str().to_string()),
        );
        effects.audit.push(AuditEffect::Failed { failed_phase: from });
        effects.event(EventReason::AnalysisFailed, failure.message.clone());

        self.commit(analysis, status, effects).await?;
        warn!(
            failed_phase = %from,
            reason = %failure.reason,
            sub_reason = %failure.sub_reason,
            message = %failure.message,
            "analysis failed"
        );
        Ok(ReconcileOutcome::Done)
    }

    /// Write the status, then emit the queued side effects.
    async fn commit(
        &self,
        analysis: &mut AIAnalysis,
        mut status: AnalysisStatus,
        effects: Effects,
    ) -> Result<(), ReconcileError> {
        if let Some(session) = &status.investigation_session {
            status.session_generation = status.session_generation.max(session.generation);
        }
        let key = analysis.key();
        let version = self
            .repository
            .update_status(&key, analysis.metadata.resource_version, &status)
            .await?;
        let previous = analysis.status.phase;
        analysis.metadata.resource_version = version;
        analysis.status = status;
        if previous != analysis.status.phase {
            debug!(from = %previous, to = %analysis.status.phase, version, "phase committed");
        }
        self.emit(analysis, effects);
        Ok(())
    }

    fn emit(&self, analysis: &AIAnalysis, effects: Effects) {
        for effect in effects.audit {
            match effect {
                AuditEffect::Transition {
                    old_phase,
                    new_phase,
                    reason,
                } => {
                    self.audit
                        .phase_transition(analysis, old_phase, new_phase, reason);
                }
                AuditEffect::Session { action, session } => {
                    self.audit.session_lifecycle(analysis, action, &session);
                }
                AuditEffect::Policy { input, decision } => {
                    self.audit.policy_evaluation(analysis, &input, &decision);
                }
                AuditEffect::ApprovalDecision => {
                    self.audit.approval_decision(analysis);
                }
                AuditEffect::Completed => {
                    self.audit.analysis_completed(analysis);
                }
                AuditEffect::Failed { failed_phase } => {
                    self.audit.analysis_failed(analysis, failed_phase);
                }
            }
        }
        let key = analysis.key();
        for (reason, message) in effects.events {
            self.events
                .record(ResourceEvent::new(key.clone(), reason, message));
        }
    }
}

/// Approval policy input for the selected workflow.
fn policy_input(analysis: &AIAnalysis, selected: &SelectedWorkflow) -> PolicyInput {
    let spec = &analysis.spec;
    let status = &analysis.status;
    let detected_labels = status
        .post_rca_context
        .as_ref()
        .map(|ctx| ctx.detected_labels.clone())
        .or_else(|| spec.enrichment.detected_labels.clone());

    PolicyInput {
        environment: spec.environment.clone(),
        affected_resource: status
            .root_cause
            .as_ref()
            .and_then(|rc| rc.affected_resource.clone()),
        confidence: selected.confidence,
        failed_detections: detected_labels
            .as_ref()
            .map(|labels| labels.failed_detections.clone())
            .unwrap_or_default(),
        detected_labels,
        warnings: status.warnings.clone(),
        custom_labels: spec.enrichment.custom_labels.clone(),
        recovery_attempt_number: spec.recovery_attempt_number(),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::analysis::fixtures;
    use crate::domain::models::{
        DetectedLabels, PostRcaContext, RootCause, TargetResource,
    };

    fn analyzing(environment: &str) -> AIAnalysis {
        let mut analysis = AIAnalysis::new(
            ResourceKey::new("payments", "a-1"),
            fixtures::request("OOMKilled", environment),
        );
        analysis.status.phase = Phase::Analyzing;
        analysis
    }

    fn selected(confidence: f64) -> SelectedWorkflow {
        SelectedWorkflow {
            workflow_id: "restart-pod".to_string(),
            version: None,
            container_image: None,
            parameters: Default::default(),
            confidence,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_policy_input_without_root_cause_has_no_resource() {
        let analysis = analyzing("staging");
        let input = policy_input(&analysis, &selected(0.9));
        assert!(input.affected_resource.is_none());
        assert_eq!(input.environment, "staging");
        assert_eq!(input.recovery_attempt_number, 0);
    }

    #[test]
    fn test_policy_input_prefers_post_rca_labels() {
        let mut analysis = analyzing("production");
        analysis.spec.enrichment.detected_labels = Some(DetectedLabels {
            failed_detections: vec!["enrichment".to_string()],
            ..DetectedLabels::default()
        });
        analysis.status.post_rca_context = Some(PostRcaContext {
            detected_labels: DetectedLabels {
                stateful: true,
                failed_detections: vec!["pdb_protected".to_string()],
                ..DetectedLabels::default()
            },
            set_at: Utc::now(),
        });
        analysis.status.root_cause = Some(RootCause {
            summary: "memory leak".to_string(),
            severity: None,
            contributing_factors: Vec::new(),
            affected_resource: Some(TargetResource::new("Deployment", "api")),
        });
        analysis.status.warnings = vec!["partial owner chain".to_string()];

        let input = policy_input(&analysis, &selected(0.75));
        assert_eq!(input.failed_detections, vec!["pdb_protected".to_string()]);
        assert!(input.detected_labels.unwrap().stateful);
        assert_eq!(input.affected_resource.unwrap().kind, "Deployment");
        assert_eq!(input.warnings.len(), 1);
        assert!((input.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failure_from_investigation_error() {
        let failure =
            Failure::from_investigation_error(&InvestigationError::InvalidResponse("bad".into()));
        assert_eq!(failure.sub_reason, SubReason::InvalidResponse);
        let failure = Failure::from_investigation_error(&InvestigationError::Rejected {
            status: 400,
            message: "schema".into(),
        });
        assert_eq!(failure.sub_reason, SubReason::PermanentApiError);
        assert_eq!(failure.reason, Reason::InvestigationFailed);
    }

    #[test]
    fn test_reconcile_error_classification() {
        assert!(ReconcileError::Investigation(InvestigationError::Timeout).is_transient());
        assert!(!ReconcileError::Analysis(AnalysisError::TerminalPhase(Phase::Failed)).is_transient());
    }
}
