//! Controller runtime tests: worker pool, resync and graceful shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use aianalysis::adapters::investigation::mock::MOCK_NO_WORKFLOW_FOUND;
use aianalysis::adapters::MockInvestigationClient;
use aianalysis::domain::models::{
    AuditEventType, ControllerConfig, Phase, ResourceKey, RetryConfig,
};
use aianalysis::domain::ports::{AnalysisFilter, AuditQuery, AuditStore};
use aianalysis::services::Controller;

use common::{request, setup_test_logging, Harness};

fn controller_config() -> ControllerConfig {
    ControllerConfig {
        workers: 4,
        reconcile_timeout_secs: 5,
        resync_interval_secs: 1,
        shutdown_timeout_secs: 5,
        requeue: RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
        },
    }
}

fn controller(h: &Harness) -> Arc<Controller> {
    Arc::new(Controller::new(
        Arc::clone(&h.reconciler),
        Arc::clone(&h.repository),
        h.audit.clone(),
        controller_config(),
    ))
}

async fn wait_until_terminal(h: &Harness, keys: &[ResourceKey]) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let mut done = 0;
        for key in keys {
            if h.get(key).await.phase().is_terminal() {
                done += 1;
            }
        }
        if done == keys.len() {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{done}/{} analyses terminal before deadline",
            keys.len()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_controller_drives_analyses_to_completion() {
    setup_test_logging();
    let h = Harness::with_client(MockInvestigationClient::new().with_polls_before_complete(1));

    let mut keys = Vec::new();
    for i in 0..6 {
        keys.push(h.create(&format!("ctrl-{i}"), request("OOMKilled", "staging")).await);
    }
    keys.push(h.create("ctrl-no-wf", request(MOCK_NO_WORKFLOW_FOUND, "staging")).await);

    let controller = controller(&h);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    wait_until_terminal(&h, &keys).await;
    shutdown_tx.send_replace(true);
    let report = run.await.unwrap();

    assert!(report.drained);
    assert_eq!(report.aborted, 0);
    assert!(report.audit.is_some_and(|flush| flush.is_clean()));

    let completed = h
        .repository
        .list(AnalysisFilter {
            phase: Some(Phase::Completed),
            ..AnalysisFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(completed.len(), 6);
    let failed = h.get(&keys[6]).await;
    assert_eq!(failed.phase(), Phase::Failed);

    // Everything recorded during the run is durable after shutdown.
    for key in &keys {
        let analysis = h.get(key).await;
        let events = h
            .store
            .query(&AuditQuery::for_correlation(analysis.correlation_id()))
            .await
            .unwrap();
        let terminal = events
            .iter()
            .filter(|e| {
                matches!(
                    e.event_type(),
                    AuditEventType::AnalysisCompleted | AuditEventType::AnalysisFailed
                )
            })
            .count();
        assert_eq!(terminal, 1, "exactly one terminal audit for {key}");
    }
}

#[tokio::test]
async fn test_transient_errors_are_retried_with_backoff() {
    let h = Harness::new();
    h.investigation.force_transient_failures(3);
    let key = h.create("flaky", request("OOMKilled", "staging")).await;

    let controller = controller(&h);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    wait_until_terminal(&h, std::slice::from_ref(&key)).await;
    shutdown_tx.send_replace(true);
    run.await.unwrap();

    assert_eq!(h.get(&key).await.phase(), Phase::Completed);
    assert!(h.investigation.poll_count() >= 4);
}

#[tokio::test]
async fn test_analyses_added_after_start_are_picked_up() {
    let h = Harness::new();
    let controller = controller(&h);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let key = h.create("late", request("OOMKilled", "staging")).await;
    controller.enqueue(key.clone());

    wait_until_terminal(&h, std::slice::from_ref(&key)).await;
    shutdown_tx.send_replace(true);
    let report = run.await.unwrap();
    assert!(report.drained);
}

#[tokio::test]
async fn test_resync_enqueues_only_non_terminal() {
    let h = Harness::new();
    h.run("done", request("OOMKilled", "staging")).await;
    let open = h.create("open", request("OOMKilled", "staging")).await;

    let controller = controller(&h);
    assert_eq!(controller.resync().await.unwrap(), 1);
    let queue = controller.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.get().await, Some(open));
}

#[tokio::test]
async fn test_shutdown_with_idle_queue_flushes_audit() {
    let h = Harness::new();
    let controller = controller(&h);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run(shutdown_rx).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(shutdown_tx);
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("controller stops when the shutdown sender is dropped")
        .unwrap();

    assert!(report.drained);
    assert!(report.audit.is_some());
    assert!(controller.queue().is_shutting_down());
}
