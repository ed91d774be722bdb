//! Common test utilities for integration tests
//!
//! Provides shared fixtures, an in-memory reconciler harness, and helpers
//! used across multiple integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use aianalysis::adapters::{
    InMemoryAnalysisRepository, InMemoryAuditStore, InMemoryEventRecorder,
    MockInvestigationClient,
};
use aianalysis::domain::models::{
    AIAnalysis, AnalysisRequest, AnalysisStatus, AuditEvent, AuditEventType, AuditPayload,
    EnrichmentResults, Phase, ResourceKey, TargetResource,
};
use aianalysis::domain::ports::{
    AnalysisFilter, AnalysisRepository, AuditQuery, AuditStore, PolicyEvaluator, RepositoryError,
};
use aianalysis::services::{
    AnalysisReconciler, ApprovalPolicy, AuditEmitter, AuditEmitterConfig, PolicyEngine,
    ReconcileOutcome, ReconcilerConfig,
};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A valid request with a unique remediation ID.
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

pub fn default_policy() -> Arc<dyn PolicyEvaluator> {
    Arc::new(PolicyEngine::from_policy(&ApprovalPolicy::default(), 0.8).expect("default policy compiles"))
}

pub fn reconciler_config() -> ReconcilerConfig {
    ReconcilerConfig {
        poll_interval: Duration::from_millis(10),
        ..ReconcilerConfig::default()
    }
}

pub fn emitter_config() -> AuditEmitterConfig {
    AuditEmitterConfig {
        flush_interval: Duration::from_millis(50),
        ..AuditEmitterConfig::default()
    }
}

/// Repository that reports a version conflict for the next `n` writes.
pub struct ConflictingRepository {
    inner: InMemoryAnalysisRepository,
    conflicts: AtomicU32,
}

impl ConflictingRepository {
    pub fn new(inner: InMemoryAnalysisRepository) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(0),
        }
    }

    pub fn conflict_next_writes(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisRepository for ConflictingRepository {
    async fn create(&self, analysis: &AIAnalysis) -> Result<(), RepositoryError> {
        self.inner.create(analysis).await
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<AIAnalysis>, RepositoryError> {
        self.inner.get(key).await
    }

    async fn list(&self, filter: AnalysisFilter) -> Result<Vec<AIAnalysis>, RepositoryError> {
        self.inner.list(filter).await
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: &AnalysisStatus,
    ) -> Result<u64, RepositoryError> {
        let conflicted = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflicted {
            return Err(RepositoryError::Conflict {
                key: key.clone(),
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner.update_status(key, expected_version, status).await
    }
}

/// Reconciler wired to in-memory collaborators.
pub struct Harness {
    pub repository: Arc<dyn AnalysisRepository>,
    pub investigation: Arc<MockInvestigationClient>,
    pub store: Arc<InMemoryAuditStore>,
    pub events: Arc<InMemoryEventRecorder>,
    pub audit: AuditEmitter,
    pub reconciler: Arc<AnalysisReconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_client(MockInvestigationClient::new())
    }

    pub fn with_client(client: MockInvestigationClient) -> Self {
        Self::build(
            Arc::new(InMemoryAnalysisRepository::new()),
            client,
            default_policy(),
            reconciler_config(),
        )
    }

    pub fn build(
        repository: Arc<dyn AnalysisRepository>,
        client: MockInvestigationClient,
        policy: Arc<dyn PolicyEvaluator>,
        config: ReconcilerConfig,
    ) -> Self {
        let investigation = Arc::new(client);
        let store = Arc::new(InMemoryAuditStore::new());
        let events = Arc::new(InMemoryEventRecorder::new());
        let audit = AuditEmitter::start(store.clone(), emitter_config());
        let reconciler = Arc::new(AnalysisReconciler::new(
            Arc::clone(&repository),
            investigation.clone(),
            policy,
            audit.clone(),
            events.clone(),
            config,
        ));
        Self {
            repository,
            investigation,
            store,
            events,
            audit,
            reconciler,
        }
    }

    pub async fn create(&self, name: &str, request: AnalysisRequest) -> ResourceKey {
        let analysis = AIAnalysis::new(ResourceKey::new("payments", name), request);
        self.repository
            .create(&analysis)
            .await
            .expect("create analysis");
        analysis.key()
    }

    pub async fn get(&self, key: &ResourceKey) -> AIAnalysis {
        self.repository
            .get(key)
            .await
            .expect("get analysis")
            .expect("analysis exists")
    }

    pub async fn reconcile(&self, key: &ResourceKey) -> ReconcileOutcome {
        self.reconciler.reconcile(key).await.expect("reconcile")
    }

    /// Reconcile until the analysis is terminal, retrying transient errors.
    pub async fn run_to_terminal(&self, key: &ResourceKey) -> AIAnalysis {
        for _ in 0..100 {
            let analysis = self.get(key).await;
            if analysis.phase().is_terminal() {
                return analysis;
            }
            match self.reconciler.reconcile(key).await {
                Ok(_) => {}
                Err(err) if err.is_transient() => {}
                Err(err) => panic!("permanent reconcile error: {err}"),
            }
        }
        panic!("analysis {key} did not reach a terminal phase");
    }

    /// Create an analysis and drive it to completion.
    pub async fn run(&self, name: &str, request: AnalysisRequest) -> AIAnalysis {
        let key = self.create(name, request).await;
        self.run_to_terminal(&key).await
    }

    /// Flush the emitter, then read back every event of the lifecycle.
    pub async fn audit_events(&self, correlation_id: &str) -> Vec<AuditEvent> {
        self.audit.flush().await.expect("flush audit");
        self.store
            .query(&AuditQuery::for_correlation(correlation_id))
            .await
            .expect("query audit")
    }

    pub async fn audit_count(&self, correlation_id: &str, event_type: AuditEventType) -> usize {
        self.audit_events(correlation_id)
            .await
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    /// `(old, new)` of every phase-transition event, in emission order.
    pub async fn transitions(&self, correlation_id: &str) -> Vec<(Phase, Phase)> {
        self.audit_events(correlation_id)
            .await
            .into_iter()
            .filter_map(|e| match e.payload {
                AuditPayload::PhaseTransition(data) => Some((data.old_phase, data.new_phase)),
                _ => None,
            })
            .collect()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
