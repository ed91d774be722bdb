//! Controller runtime: worker pool, periodic resync and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::models::{ControllerConfig, ResourceKey};
use crate::domain::ports::{AnalysisFilter, AnalysisRepository, RepositoryError};
use crate::services::audit_emitter::{AuditEmitter, FlushReport};
use crate::services::reconciler::{AnalysisReconciler, ReconcileOutcome};
use crate::services::work_queue::WorkQueue;

/// How the controller stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All in-flight reconciles finished within the shutdown timeout.
    pub drained: bool,
    /// Reconciles aborted at the deadline.
    pub aborted: usize,
    /// Final audit flush, if it completed in time.
    pub audit: Option<FlushReport>,
}

pub struct Controller {
    reconciler: Arc<AnalysisReconciler>,
    repository: Arc<dyn AnalysisRepository>,
    audit: AuditEmitter,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        reconciler: Arc<AnalysisReconciler>,
        repository: Arc<dyn AnalysisRepository>,
        audit: AuditEmitter,
        config: ControllerConfig,
    ) -> Self {
        let queue = WorkQueue::new(&config.requeue);
        Self {
            reconciler,
            repository,
            audit,
            queue,
            config,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    pub fn enqueue(&self, key: ResourceKey) {
        self.queue.add(key);
    }

    /// Enqueue every analysis that has not reached a terminal phase.
    pub async fn resync(&self) -> Result<usize, RepositoryError> {
        let pending = self.repository.list(AnalysisFilter::non_terminal()).await?;
        let count = pending.len();
        for analysis in pending {
            self.queue.add(analysis.key());
        }
        debug!(count, "resync enqueued non-terminal analyses");
        Ok(count)
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ShutdownReport {
        let workers = self.config.workers.max(1);
        info!(
            workers,
            resync_interval_secs = self.config.resync_interval_secs,
            "controller starting"
        );

        if let Err(err) = self.resync().await {
            error!(error = %err, "initial resync failed");
        }

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let worker = Worker {
                id: worker_id,
                reconciler: Arc::clone(&self.reconciler),
                queue: Arc::clone(&self.queue),
                reconcile_timeout: Duration::from_secs(self.config.reconcile_timeout_secs),
                max_retries: self.config.requeue.max_retries,
            };
            pool.spawn(worker.run());
        }

        let mut resync = tokio::time::interval(Duration::from_secs(
            self.config.resync_interval_secs.max(1),
        ));
        resync.tick().await;

        loop {
            tokio::select! {
                _ = resync.tick() => {
                    if let Err(err) = self.resync().await {
                        warn!(error = %err, "resync failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.shutdown(pool).await
    }

    async fn shutdown(&self, mut pool: JoinSet<()>) -> ShutdownReport {
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        info!(
            in_flight = self.queue.in_flight(),
            timeout_secs = timeout.as_secs(),
            "controller shutting down"
        );
        self.queue.shutdown();

        let mut report = ShutdownReport::default();
        let drain = async {
            while let Some(joined) = pool.join_next().await {
                if let Err(err) = joined {
                    error!(error = %err, "reconcile worker panicked");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_ok() {
            report.drained = true;
        } else {
            report.aborted = pool.len();
            warn!(aborted = report.aborted, "shutdown deadline reached, aborting reconciles");
            pool.abort_all();
            while pool.join_next().await.is_some() {}
        }

        match tokio::time::timeout(timeout, self.audit.close()).await {
            Ok(Ok(flush)) => {
                if !flush.is_clean() {
                    warn!(
                        deferred = flush.deferred,
                        discarded = flush.discarded,
                        "final audit flush incomplete"
                    );
                }
                report.audit = Some(flush);
            }
            Ok(Err(err)) => error!(error = %err, "final audit flush failed"),
            Err(_) => error!(timeout_secs = timeout.as_secs(), "final audit flush timed out"),
        }

        info!(drained = report.drained, "controller stopped");
        report
    }
}

struct Worker {
    id: usize,
    reconciler: Arc<AnalysisReconciler>,
    queue: Arc<WorkQueue>,
    reconcile_timeout: Duration,
    max_retries: u32,
}

impl Worker {
    async fn run(self) {
        debug!(worker = self.id, "reconcile worker started");
        while let Some(key) = self.queue.get().await {
            self.process(&key).await;
            self.queue.done(&key);
        }
        debug!(worker = self.id, "reconcile worker stopped");
    }

    async fn process(&self, key: &ResourceKey) {
        let result = tokio::time::timeout(self.reconcile_timeout, self.reconciler.reconcile(key)).await;

        match result {
            Ok(Ok(ReconcileOutcome::Done)) => self.queue.forget(key),
            Ok(Ok(ReconcileOutcome::Requeue(after))) => {
                self.queue.forget(key);
                self.queue.add_after(key.clone(), after);
            }
            Ok(Err(err)) if err.is_transient() => {
                let delay = self.queue.add_rate_limited(key.clone());
                warn!(
                    key = %key,
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "reconcile failed, requeued"
                );
            }
            Ok(Err(err)) => {
                if self.queue.num_requeues(key) >= self.max_retries {
                    error!(key = %key, error = %err, "reconcile keeps failing, giving up until next resync");
                    self.queue.forget(key);
                } else {
                    let delay = self.queue.add_rate_limited(key.clone());
                    error!(
                        key = %key,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "reconcile failed"
                    );
                }
            }
            Err(_) => {
                let delay = self.queue.add_rate_limited(key.clone());
                warn!(
                    key = %key,
                    timeout_secs = self.reconcile_timeout.as_secs(),
                    retry_in_ms = delay.as_millis() as u64,
                    "reconcile timed out, requeued"
                );
            }
        }
    }
}
