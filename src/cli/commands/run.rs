//! `aianalysis run`: the controller process.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapters::{
    HttpInvestigationClient, MockInvestigationClient, SqliteAnalysisRepository,
    TracingEventRecorder,
};
use crate::cli::commands::{audit_store, load_config, open_database};
use crate::cli::output::{output, CommandOutput};
use crate::domain::ports::{AnalysisRepository, InvestigationClient};
use crate::infrastructure::logging::LoggerImpl;
use crate::services::{
    AnalysisReconciler, AuditEmitter, AuditEmitterConfig, Controller, PolicyEngine,
    ReconcilerConfig, ShutdownReport,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Answer investigations with the built-in mock instead of the HTTP service
    #[arg(long)]
    pub mock: bool,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub drained: bool,
    pub aborted: usize,
    pub audit_written: Option<usize>,
    pub audit_discarded: Option<usize>,
    pub audit_dropped: u64,
}

impl RunOutput {
    fn new(report: ShutdownReport, audit_dropped: u64) -> Self {
        Self {
            drained: report.drained,
            aborted: report.aborted,
            audit_written: report.audit.map(|f| f.written),
            audit_discarded: report.audit.map(|f| f.discarded),
            audit_dropped,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![if self.drained {
            "Controller stopped; all in-flight reconciles finished.".to_string()
        } else {
            format!("Controller stopped; {} reconcile(s) aborted.", self.aborted)
        }];
        match (self.audit_written, self.audit_discarded) {
            (Some(written), Some(0)) => {
                lines.push(format!("Audit: final flush wrote {written} event(s)."));
            }
            (Some(written), Some(discarded)) => lines.push(format!(
                "Audit: final flush wrote {written} event(s), discarded {discarded}."
            )),
            _ => lines.push("Audit: final flush did not complete.".to_string()),
        }
        if self.audit_dropped > 0 {
            lines.push(format!(
                "Audit: {} event(s) dropped on a full buffer.",
                self.audit_dropped
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let _logger = LoggerImpl::init(&config.logging)?;

    let pool = open_database(&config).await?;
    let repository: Arc<dyn AnalysisRepository> =
        Arc::new(SqliteAnalysisRepository::new(pool.clone()));
    let store = audit_store(&config, pool)?;

    let investigation: Arc<dyn InvestigationClient> = if args.mock {
        info!("using mock investigation service");
        Arc::new(MockInvestigationClient::new())
    } else {
        Arc::new(
            HttpInvestigationClient::new(&config.investigation)
                .context("Failed to create investigation client")?,
        )
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let policy = Arc::new(PolicyEngine::load(&config.policy));
    let watcher = Arc::clone(&policy).spawn_watcher(
        Duration::from_secs(config.policy.reload_interval_secs.max(1)),
        shutdown_rx.clone(),
    );

    let audit = AuditEmitter::start(store, AuditEmitterConfig::from(&config.audit));
    let reconciler = Arc::new(AnalysisReconciler::new(
        Arc::clone(&repository),
        investigation,
        policy,
        audit.clone(),
        Arc::new(TracingEventRecorder),
        ReconcilerConfig::from_config(&config),
    ));
    let controller = Controller::new(
        reconciler,
        repository,
        audit.clone(),
        config.controller.clone(),
    );

    let run = controller.run(shutdown_rx);
    tokio::pin!(run);
    let report = tokio::select! {
        report = &mut run => report,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "failed to listen for interrupt, shutting down");
            }
            info!("shutdown requested");
            shutdown_tx.send_replace(true);
            run.await
        }
    };

    if let Err(err) = watcher.await {
        warn!(error = %err, "policy watcher ended abnormally");
    }

    output(&RunOutput::new(report, audit.stats().dropped), json_mode);
    Ok(())
}
