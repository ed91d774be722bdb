//! `aianalysis audit`: query the audit trail of one remediation.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;

use crate::cli::commands::{audit_store, load_config, open_database};
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{AuditEvent, AuditEventType, AuditRecord};
use crate::domain::ports::AuditQuery;

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Correlation ID (the remediation ID) to query
    #[arg(long)]
    pub correlation_id: String,

    /// Only show events of this type, e.g. aianalysis.phase.transition
    #[arg(long)]
    pub event_type: Option<String>,

    /// Maximum number of events to return
    #[arg(short, long, default_value = "200")]
    pub limit: usize,
}

fn parse_event_type(raw: &str) -> Result<AuditEventType> {
    AuditEventType::from_str(raw).with_context(|| {
        let known: Vec<&str> = AuditEventType::ALL.iter().map(AuditEventType::as_str).collect();
        format!("Unknown event type '{raw}'; expected one of: {}", known.join(", "))
    })
}

#[derive(Debug, Serialize)]
pub struct AuditListOutput {
    pub correlation_id: String,
    pub events: Vec<AuditRecord>,
    pub total: usize,
}

impl AuditListOutput {
    pub fn new(correlation_id: String, events: &[AuditEvent]) -> Result<Self> {
        let events = events
            .iter()
            .map(AuditEvent::to_record)
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to encode audit events")?;
        let total = events.len();
        Ok(Self {
            correlation_id,
            events,
            total,
        })
    }
}

impl CommandOutput for AuditListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["time", "type", "outcome", "resource", "data"]);
        for e in &self.events {
            let resource = match (&e.resource_namespace, &e.resource_name) {
                (Some(ns), Some(name)) => format!("{ns}/{name}"),
                _ => "-".to_string(),
            };
            table.add_row(vec![
                e.event_timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                e.event_type.clone(),
                e.event_outcome.clone(),
                resource,
                truncate(&e.event_data.to_string(), 80),
            ]);
        }
        render_list("audit event", "audit events", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: AuditArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let mut query = AuditQuery::for_correlation(&args.correlation_id).with_limit(args.limit);
    if let Some(raw) = &args.event_type {
        query = query.with_event_type(parse_event_type(raw)?);
    }

    let config = load_config(config_path)?;
    let store = audit_store(&config, open_database(&config).await?)?;
    let events = store
        .query(&query)
        .await
        .with_context(|| format!("Failed to query audit events for {}", args.correlation_id))?;

    output(&AuditListOutput::new(args.correlation_id, &events)?, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AuditPayload, Phase, PhaseTransitionData};

    #[test]
    fn test_parse_event_type() {
        assert_eq!(
            parse_event_type("aianalysis.approval.decision").unwrap(),
            AuditEventType::ApprovalDecision
        );
        let err = parse_event_type("approval").unwrap_err().to_string();
        assert!(err.contains("aianalysis.phase.transition"));
    }

    #[test]
    fn test_output_lists_records() {
        let event = AuditEvent::new(
            "rr-1",
            AuditPayload::PhaseTransition(PhaseTransitionData {
                old_phase: Phase::Pending,
                new_phase: Phase::Investigating,
                reason: None,
            }),
        );
        let out = AuditListOutput::new("rr-1".to_string(), &[event]).unwrap();
        assert_eq!(out.total, 1);
        let human = out.to_human();
        assert!(human.starts_with("1 audit event:"));
        assert!(human.contains("aianalysis.phase.transition"));
        assert_eq!(out.to_json()["events"][0]["correlation_id"], "rr-1");
    }
}
