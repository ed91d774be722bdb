//! Buffered audit emitter.
//!
//! Recording is a non-blocking `try_send` into a bounded channel. A single
//! background writer drains the channel, writes in batches, and flushes on
//! a timer or on request. Store failures are logged and retried once on
//! the next flush cycle; they are never reported to the caller of
//! `record`.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::models::{
    AIAnalysis, AnalysisCompletedData, AnalysisFailedData, ApprovalDecisionData, AuditConfig,
    AuditEvent, AuditEventType, AuditPayload, ErrorOccurredData, InvestigationCallData,
    InvestigationSession, Phase, PhaseTransitionData, PolicyDecision, PolicyEvaluationData,
    PolicyInput, SessionAction, SessionLifecycleData,
};
use crate::domain::ports::AuditStore;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuditEmitterError {
    #[error("Audit emitter is closed")]
    Closed,

    #[error("Audit writer task stopped unexpectedly")]
    WriterStopped,
}

#[derive(Debug, Clone)]
pub struct AuditEmitterConfig {
    pub buffer_size: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub write_timeout: Duration,
    /// Analysis/type pairs remembered for once-per-lifecycle dedup.
    pub dedup_capacity: usize,
}

impl Default for AuditEmitterConfig {
    fn default() -> Self {
        Self::from(&AuditConfig::default())
    }
}

impl From<&AuditConfig> for AuditEmitterConfig {
    fn from(config: &AuditConfig) -> Self {
        Self {
            buffer_size: config.buffer_size.max(1),
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_millis(config.flush_interval_ms.max(1)),
            write_timeout: Duration::from_secs(config.write_timeout_secs.max(1)),
            dedup_capacity: config.buffer_size.max(1),
        }
    }
}

/// Result of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Events durably written during the cycle.
    pub written: usize,
    /// Events whose first write failed; retried on the next cycle.
    pub deferred: usize,
    /// Events dropped after their retry failed.
    pub discarded: usize,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.deferred == 0 && self.discarded == 0
    }

    fn absorb(&mut self, other: Self) {
        self.written += other.written;
        self.deferred += other.deferred;
        self.discarded += other.discarded;
    }
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub recorded: u64,
    pub dropped: u64,
    pub deduplicated: u64,
    pub written: u64,
    pub discarded: u64,
}

enum Command {
    Event(Box<AuditEvent>),
    Flush(oneshot::Sender<FlushReport>),
    Shutdown(oneshot::Sender<FlushReport>),
}

#[derive(Default)]
struct DedupWindow {
    seen: HashSet<(String, AuditEventType)>,
    order: VecDeque<(String, AuditEventType)>,
}

impl DedupWindow {
    fn insert(&mut self, key: (String, AuditEventType), capacity: usize) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() >= capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    fn remove(&mut self, key: &(String, AuditEventType)) {
        if self.seen.remove(key) {
            self.order.retain(|k| k != key);
        }
    }
}

#[derive(Default)]
struct Shared {
    dedup: Mutex<DedupWindow>,
    closed: AtomicBool,
    recorded: AtomicU64,
    dropped: AtomicU64,
    deduplicated: AtomicU64,
    written: AtomicU64,
    discarded: AtomicU64,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to the audit pipeline.
#[derive(Clone)]
pub struct AuditEmitter {
    tx: mpsc::Sender<Command>,
    shared: Arc<Shared>,
    dedup_capacity: usize,
}

impl AuditEmitter {
    /// Spawn the background writer. Must be called within a tokio runtime.
    pub fn start(store: Arc<dyn AuditStore>, config: AuditEmitterConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size);
        let shared = Arc::new(Shared::default());
        let dedup_capacity = config.dedup_capacity;

        let writer = Writer {
            store,
            batch_size: config.batch_size,
            write_timeout: config.write_timeout,
            buffer: Vec::with_capacity(config.batch_size),
            retry: Vec::new(),
            shared: Arc::clone(&shared),
        };
        let handle = tokio::spawn(writer.run(rx, config.flush_interval));
        *shared.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Self {
            tx,
            shared,
            dedup_capacity,
        }
    }

    /// Queue an event without waiting.
    ///
    /// Returns false when the event was not queued: the emitter is closed,
    /// the buffer is full, or a once-per-lifecycle event was already
    /// recorded for the same analysis.
    pub fn record(&self, event: AuditEvent) -> bool {
        if self.shared.closed.load(Ordering::Acquire) {
            debug!(event_type = %event.event_type(), "audit emitter closed, event ignored");
            return false;
        }

        let dedup_key = event
            .event_type()
            .is_once_per_lifecycle()
            .then(|| (lifecycle_key(&event), event.event_type()));
        if let Some(key) = &dedup_key {
            let mut window = self.shared.dedup.lock().unwrap_or_else(PoisonError::into_inner);
            if !window.insert(key.clone(), self.dedup_capacity) {
                self.shared.deduplicated.fetch_add(1, Ordering::Relaxed);
                debug!(
                    lifecycle = %key.0,
                    event_type = %key.1,
                    "duplicate once-per-lifecycle audit event suppressed"
                );
                return false;
            }
        }

        let event_type = event.event_type();
        match self.tx.try_send(Command::Event(Box::new(event))) {
            Ok(()) => {
                self.shared.recorded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                if let Some(key) = &dedup_key {
                    self.shared
                        .dedup
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(key);
                }
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!(event_type = %event_type, "audit buffer full, event dropped");
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        warn!(event_type = %event_type, "audit writer stopped, event dropped");
                    }
                }
                false
            }
        }
    }

    /// Record a payload attributed to `analysis`.
    pub fn record_for(&self, analysis: &AIAnalysis, payload: AuditPayload) -> bool {
        self.record(AuditEvent::new(analysis.correlation_id(), payload).with_resource(analysis.key()))
    }

    pub fn phase_transition(
        &self,
        analysis: &AIAnalysis,
        old_phase: Phase,
        new_phase: Phase,
        reason: Option<String>,
    ) -> bool {
        self.record_for(
            analysis,
            AuditPayload::PhaseTransition(PhaseTransitionData {
                old_phase,
                new_phase,
                reason,
            }),
        )
    }

    pub fn investigation_call(&self, analysis: &AIAnalysis, data: InvestigationCallData) -> bool {
        self.record_for(analysis, AuditPayload::InvestigationCall(data))
    }

    pub fn session_lifecycle(
        &self,
        analysis: &AIAnalysis,
        action: SessionAction,
        session: &InvestigationSession,
    ) -> bool {
        self.record_for(
            analysis,
            AuditPayload::SessionLifecycle(SessionLifecycleData {
                action,
                session_id: Some(session.id.clone()),
                generation: session.generation,
                poll_count: session.poll_count,
            }),
        )
    }

    pub fn policy_evaluation(
        &self,
        analysis: &AIAnalysis,
        input: &PolicyInput,
        decision: &PolicyDecision,
    ) -> bool {
        self.record_for(
            analysis,
            AuditPayload::PolicyEvaluation(PolicyEvaluationData {
                environment: input.environment.clone(),
                confidence: input.confidence,
                approval_required: decision.approval_required,
                degraded: decision.degraded,
                reason: decision.reason.clone(),
            }),
        )
    }

    /// Approval decision as recorded in the analysis status.
    pub fn approval_decision(&self, analysis: &AIAnalysis) -> bool {
        let status = &analysis.status;
        let Some(context) = &status.approval_context else {
            warn!(name = %analysis.metadata.name, "approval decision without approval context");
            return false;
        };
        self.record_for(
            analysis,
            AuditPayload::ApprovalDecision(ApprovalDecisionData {
                decision: if status.approval_required {
                    "requires_approval".to_string()
                } else {
                    "auto_approved".to_string()
                },
                approval_required: status.approval_required,
                workflow_id: status
                    .selected_workflow
                    .as_ref()
                    .map(|w| w.workflow_id.clone())
                    .unwrap_or_default(),
                confidence: context.confidence_score,
                confidence_level: context.confidence_level,
                reason: context.reason.clone(),
                degraded: context.degraded,
            }),
        )
    }

    pub fn analysis_completed(&self, analysis: &AIAnalysis) -> bool {
        let status = &analysis.status;
        self.record_for(
            analysis,
            AuditPayload::AnalysisCompleted(AnalysisCompletedData {
                reason: status
                    .reason
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_default(),
                sub_reason: status.sub_reason.map(|s| s.as_str().to_string()),
                workflow_id: status
                    .selected_workflow
                    .as_ref()
                    .map(|w| w.workflow_id.clone()),
                confidence: status.selected_workflow.as_ref().map(|w| w.confidence),
                approval_required: status.approval_required,
                investigation_time_ms: status.investigation_time_ms,
            }),
        )
    }

    pub fn analysis_failed(&self, analysis: &AIAnalysis, failed_phase: Phase) -> bool {
        let status = &analysis.status;
        self.record_for(
            analysis,
            AuditPayload::AnalysisFailed(AnalysisFailedData {
                failed_phase,
                reason: status
                    .reason
                    .map(|r| r.as_str().to_string())
                    .unwrap_or_default(),
                sub_reason: status.sub_reason.map(|s| s.as_str().to_string()),
                message: status.message.clone().unwrap_or_default(),
                needs_human_review: status.needs_human_review,
            }),
        )
    }

    pub fn error_occurred(
        &self,
        analysis: &AIAnalysis,
        operation: &str,
        error: &str,
        transient: bool,
    ) -> bool {
        self.record_for(
            analysis,
            AuditPayload::ErrorOccurred(ErrorOccurredData {
                phase: analysis.phase(),
                operation: operation.to_string(),
                error: error.to_string(),
                transient,
            }),
        )
    }

    /// Write everything recorded before this call.
    pub async fn flush(&self) -> Result<FlushReport, AuditEmitterError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(AuditEmitterError::Closed);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| AuditEmitterError::WriterStopped)?;
        ack_rx.await.map_err(|_| AuditEmitterError::WriterStopped)
    }

    /// Final flush, then stop the writer. Later calls return an empty
    /// report; later `record` calls are ignored.
    pub async fn close(&self) -> Result<FlushReport, AuditEmitterError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(FlushReport::default());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let report = match self.tx.send(Command::Shutdown(ack_tx)).await {
            Ok(()) => ack_rx.await.map_err(|_| AuditEmitterError::WriterStopped)?,
            Err(_) => return Err(AuditEmitterError::WriterStopped),
        };

        let handle = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "audit writer task panicked");
            }
        }
        Ok(report)
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            recorded: self.shared.recorded.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            deduplicated: self.shared.deduplicated.load(Ordering::Relaxed),
            written: self.shared.written.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Identity of one analysis lifecycle. Recovery attempts share the
/// remediation's correlation ID but are separate resources.
fn lifecycle_key(event: &AuditEvent) -> String {
    match &event.resource {
        Some(resource) => format!("{}|{resource}", event.correlation_id),
        None => event.correlation_id.clone(),
    }
}

struct Writer {
    store: Arc<dyn AuditStore>,
    batch_size: usize,
    write_timeout: Duration,
    buffer: Vec<AuditEvent>,
    /// Events whose first write failed.
    retry: Vec<AuditEvent>,
    shared: Arc<Shared>,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Event(event)) => {
                        self.buffer.push(*event);
                        if self.buffer.len() >= self.batch_size {
                            let batch = std::mem::take(&mut self.buffer);
                            self.write_fresh(batch).await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        let report = self.flush_cycle().await;
                        let _ = ack.send(report);
                    }
                    Some(Command::Shutdown(ack)) => {
                        while let Ok(command) = rx.try_recv() {
                            match command {
                                Command::Event(event) => self.buffer.push(*event),
                                Command::Flush(pending) | Command::Shutdown(pending) => {
                                    let _ = pending.send(FlushReport::default());
                                }
                            }
                        }
                        let mut report = self.flush_cycle().await;
                        if !self.retry.is_empty() {
                            report.absorb(self.flush_cycle().await);
                        }
                        let _ = ack.send(report);
                        break;
                    }
                    None => {
                        self.flush_cycle().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() || !self.retry.is_empty() {
                        self.flush_cycle().await;
                    }
                }
            }
        }
        debug!("audit writer stopped");
    }

    /// Retry previously failed events once, then write the buffer.
    async fn flush_cycle(&mut self) -> FlushReport {
        let mut report = FlushReport::default();

        let retry = std::mem::take(&mut self.retry);
        for chunk in retry.chunks(self.batch_size) {
            if self.write(chunk).await {
                report.written += chunk.len();
            } else {
                report.discarded += chunk.len();
                self.shared
                    .discarded
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                error!(
                    count = chunk.len(),
                    "audit batch failed twice, events discarded"
                );
            }
        }

        let buffer = std::mem::take(&mut self.buffer);
        report.absorb(self.write_fresh(buffer).await);
        report
    }

    async fn write_fresh(&mut self, batch: Vec<AuditEvent>) -> FlushReport {
        let mut report = FlushReport::default();
        for chunk in batch.chunks(self.batch_size) {
            if self.write(chunk).await {
                report.written += chunk.len();
            } else {
                report.deferred += chunk.len();
                self.retry.extend_from_slice(chunk);
            }
        }
        report
    }

    async fn write(&self, chunk: &[AuditEvent]) -> bool {
        if chunk.is_empty() {
            return true;
        }
        match tokio::time::timeout(self.write_timeout, self.store.store_batch(chunk)).await {
            Ok(Ok(())) => {
                self.shared
                    .written
                    .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                true
            }
            Ok(Err(err)) => {
                warn!(count = chunk.len(), error = %err, "audit batch write failed");
                false
            }
            Err(_) => {
                warn!(
                    count = chunk.len(),
                    timeout_ms = self.write_timeout.as_millis() as u64,
                    "audit batch write timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryAuditStore;
    use crate::domain::models::analysis::fixtures;
    use crate::domain::models::{RecoveryContext, ResourceKey};
    use crate::domain::ports::AuditQuery;
    use std::time::Instant;

    fn config() -> AuditEmitterConfig {
        AuditEmitterConfig {
            buffer_size: 1_000,
            batch_size: 10,
            flush_interval: Duration::from_secs(60),
            write_timeout: Duration::from_secs(1),
            dedup_capacity: 100,
        }
    }

    fn analysis() -> AIAnalysis {
        AIAnalysis::new(
            ResourceKey::new("payments", "analysis-1"),
            fixtures::request("OOMKilled", "staging"),
        )
    }

    fn transition(analysis: &AIAnalysis) -> AuditEvent {
        AuditEvent::new(
            analysis.correlation_id(),
            AuditPayload::PhaseTransition(PhaseTransitionData {
                old_phase: Phase::Pending,
                new_phase: Phase::Investigating,
                reason: None,
            }),
        )
    }

    #[tokio::test]
    async fn test_record_does_not_block_on_slow_store() {
        let store = InMemoryAuditStore::new();
        store.set_latency(Some(Duration::from_millis(200))).await;
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let analysis = analysis();

        let started = Instant::now();
        for _ in 0..100 {
            assert!(emitter.record(transition(&analysis)));
        }
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "recording 100 events took {:?}",
            started.elapsed()
        );

        store.set_latency(None).await;
        emitter.close().await.unwrap();
        assert_eq!(store.len().await, 100);
    }

    #[tokio::test]
    async fn test_flush_makes_events_queryable() {
        let store = InMemoryAuditStore::new();
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let analysis = analysis();

        emitter.phase_transition(&analysis, Phase::Pending, Phase::Investigating, None);
        emitter.error_occurred(&analysis, "poll", "timeout", true);
        assert!(store.is_empty().await);

        let report = emitter.flush().await.unwrap();
        assert_eq!(report.written, 2);
        assert!(report.is_clean());

        let events = store
            .query(&AuditQuery::for_correlation(analysis.correlation_id()))
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), AuditEventType::PhaseTransition);
        assert_eq!(events[1].event_type(), AuditEventType::ErrorOccurred);
        assert_eq!(events[0].resource, Some(analysis.key()));
    }

    #[tokio::test]
    async fn test_timer_flushes_without_request() {
        let store = InMemoryAuditStore::new();
        let emitter = AuditEmitter::start(
            Arc::new(store.clone()),
            AuditEmitterConfig {
                flush_interval: Duration::from_millis(20),
                ..config()
            },
        );
        emitter.record(transition(&analysis()));

        for _ in 0..100 {
            if store.len().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len().await, 1);
        emitter.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_batches_are_written_in_chunks() {
        let store = InMemoryAuditStore::new();
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let analysis = analysis();
        for _ in 0..25 {
            emitter.record(transition(&analysis));
        }
        let report = emitter.flush().await.unwrap();
        assert_eq!(store.len().await, 25);
        // two full batches on the record path, remainder on flush
        assert_eq!(report.written, 5);
        assert_eq!(store.batch_calls(), 3);
    }

    #[tokio::test]
    async fn test_once_per_lifecycle_events_are_deduplicated() {
        let store = InMemoryAuditStore::new();
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let analysis = analysis();

        assert!(emitter.analysis_completed(&analysis));
        assert!(!emitter.analysis_completed(&analysis));
        assert!(emitter.phase_transition(&analysis, Phase::Pending, Phase::Investigating, None));
        assert!(emitter.phase_transition(&analysis, Phase::Pending, Phase::Investigating, None));

        emitter.flush().await.unwrap();
        let completed = store
            .query(
                &AuditQuery::for_correlation(analysis.correlation_id())
                    .with_event_type(AuditEventType::AnalysisCompleted),
            )
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(emitter.stats().deduplicated, 1);
    }

    #[tokio::test]
    async fn test_recovery_attempt_keeps_its_own_lifecycle_events() {
        let store = InMemoryAuditStore::new();
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let first = analysis();
        let mut spec = first.spec.clone();
        spec.recovery = Some(RecoveryContext {
            attempt_number: 1,
            previous_executions: Vec::new(),
        });
        let retry = AIAnalysis::new(ResourceKey::new("payments", "analysis-1-recovery-1"), spec);
        assert_eq!(first.correlation_id(), retry.correlation_id());

        assert!(emitter.analysis_completed(&first));
        assert!(emitter.analysis_completed(&retry));
        assert!(!emitter.analysis_completed(&retry));

        emitter.flush().await.unwrap();
        let completed = store
            .query(
                &AuditQuery::for_correlation(first.correlation_id())
                    .with_event_type(AuditEventType::AnalysisCompleted),
            )
            .await
            .unwrap();
        assert_eq!(completed.len(), 2);
        assert_eq!(emitter.stats().deduplicated, 1);
    }

    #[tokio::test]
    async fn test_failed_write_is_retried_once() {
        let store = InMemoryAuditStore::new();
        store.fail_next_writes(1);
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let analysis = analysis();
        for _ in 0..3 {
            emitter.record(transition(&analysis));
        }

        let first = emitter.flush().await.unwrap();
        assert_eq!(first.deferred, 3);
        assert!(store.is_empty().await);

        let second = emitter.flush().await.unwrap();
        assert_eq!(second.written, 3);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_twice_failed_write_is_discarded() {
        let store = InMemoryAuditStore::new();
        store.fail_next_writes(2);
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        emitter.record(transition(&analysis()));

        emitter.flush().await.unwrap();
        let report = emitter.flush().await.unwrap();
        assert_eq!(report.discarded, 1);
        assert!(store.is_empty().await);
        assert_eq!(emitter.stats().discarded, 1);
    }

    #[tokio::test]
    async fn test_close_flushes_and_rejects_new_events() {
        let store = InMemoryAuditStore::new();
        let emitter = AuditEmitter::start(Arc::new(store.clone()), config());
        let analysis = analysis();
        emitter.record(transition(&analysis));
        emitter.record(transition(&analysis));

        let report = emitter.close().await.unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(store.len().await, 2);

        assert!(!emitter.record(transition(&analysis)));
        assert_eq!(emitter.flush().await, Err(AuditEmitterError::Closed));
        assert_eq!(emitter.close().await.unwrap(), FlushReport::default());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_instead_of_blocking() {
        let store = InMemoryAuditStore::new();
        store.set_latency(Some(Duration::from_millis(300))).await;
        let emitter = AuditEmitter::start(
            Arc::new(store.clone()),
            AuditEmitterConfig {
                buffer_size: 2,
                batch_size: 1,
                ..config()
            },
        );
        let analysis = analysis();

        let started = Instant::now();
        let accepted = (0..20)
            .filter(|_| emitter.record(transition(&analysis)))
            .count();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(accepted < 20);
        assert_eq!(emitter.stats().dropped, (20 - accepted) as u64);
    }
}
