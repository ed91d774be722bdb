//! Domain models for the analysis controller.

pub mod analysis;
pub mod audit;
pub mod config;
pub mod event;
pub mod investigation;
pub mod policy;

pub use analysis::{
    AIAnalysis, AlternativeWorkflow, AnalysisRequest, AnalysisStatus, ApprovalContext, Condition,
    ConditionType, ConfidenceLevel, ConfidenceThresholds, DetectedLabels, EnrichmentResults,
    InvestigationSession, ObjectMeta, Phase, PostRcaContext, PreviousExecution, Reason,
    RecoveryContext, ResourceKey, RootCause, SelectedWorkflow, SubReason, TargetResource,
};
pub use audit::{
    AnalysisCompletedData, AnalysisFailedData, ApprovalDecisionData, AuditCategory, AuditEvent,
    AuditEventType, AuditOutcome, AuditPayload, AuditRecord, ErrorOccurredData,
    InvestigationCallData, InvestigationOperation, PhaseTransitionData, PolicyEvaluationData,
    SessionAction, SessionLifecycleData,
};
pub use config::{
    AnalysisConfig, AuditConfig, Config, ControllerConfig, DatabaseConfig, InvestigationConfig,
    LoggingConfig, PolicyConfig, RetryConfig,
};
pub use event::{EventReason, EventType, ResourceEvent};
pub use investigation::{
    InvestigationRequest, InvestigationResult, PollOutcome, RecoveryRequest, SubmitOutcome,
    WorkflowRecommendation,
};
pub use policy::{PolicyDecision, PolicyInput};
