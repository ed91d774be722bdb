//! `aianalysis status`: inspect analyses.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use std::path::Path;

use crate::adapters::SqliteAnalysisRepository;
use crate::cli::commands::{load_config, open_database};
use crate::cli::output::{age, list_table, output, render_list, truncate, CommandOutput};
use crate::domain::models::{AIAnalysis, Phase, ResourceKey};
use crate::domain::ports::{AnalysisFilter, AnalysisRepository};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Analysis to show as namespace/name; lists analyses when omitted
    pub resource: Option<String>,

    /// Only list analyses in this namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Only list analyses in this phase (Pending, Investigating, Analyzing, Completed, Failed)
    #[arg(short, long)]
    pub phase: Option<String>,

    /// Maximum number of analyses to list
    #[arg(short, long, default_value = "50")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct AnalysisSummary {
    pub namespace: String,
    pub name: String,
    pub phase: String,
    pub reason: Option<String>,
    pub workflow: Option<String>,
    pub confidence: Option<f64>,
    pub approval_required: bool,
    pub age: String,
}

impl From<&AIAnalysis> for AnalysisSummary {
    fn from(analysis: &AIAnalysis) -> Self {
        let status = &analysis.status;
        Self {
            namespace: analysis.metadata.namespace.clone(),
            name: analysis.metadata.name.clone(),
            phase: status.phase.to_string(),
            reason: status.reason.map(|r| match status.sub_reason {
                Some(sub) => format!("{r}/{sub}"),
                None => r.to_string(),
            }),
            workflow: status.selected_workflow.as_ref().map(|w| w.workflow_id.clone()),
            confidence: status.selected_workflow.as_ref().map(|w| w.confidence),
            approval_required: status.approval_required,
            age: age(analysis.metadata.created_at, Utc::now()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalysisListOutput {
    pub analyses: Vec<AnalysisSummary>,
    pub total: usize,
}

impl CommandOutput for AnalysisListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&[
            "namespace",
            "name",
            "phase",
            "reason",
            "workflow",
            "confidence",
            "approval",
            "age",
        ]);
        for a in &self.analyses {
            table.add_row(vec![
                a.namespace.clone(),
                a.name.clone(),
                a.phase.clone(),
                a.reason.clone().unwrap_or_else(|| "-".to_string()),
                a.workflow.as_deref().map_or_else(|| "-".to_string(), |w| truncate(w, 32)),
                a.confidence.map_or_else(|| "-".to_string(), |c| format!("{c:.2}")),
                if a.approval_required { "required" } else { "-" }.to_string(),
                a.age.clone(),
            ]);
        }
        render_list("analysis", "analyses", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Full view of a single analysis; JSON output is the resource itself.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct AnalysisDetailOutput {
    pub analysis: AIAnalysis,
}

impl CommandOutput for AnalysisDetailOutput {
    fn to_human(&self) -> String {
        let a = &self.analysis;
        let s = &a.status;
        let mut lines = vec![
            format!("Analysis: {}", a.key()),
            format!("  UID:            {}", a.metadata.uid),
            format!("  Correlation ID: {}", a.correlation_id()),
            format!("  Signal:         {} ({})", a.spec.signal_name, a.spec.signal_type),
            format!("  Environment:    {}", a.spec.environment),
            format!("  Target:         {}", a.spec.target_resource),
            format!("  Phase:          {}", s.phase),
        ];
        if let Some(reason) = s.reason {
            let sub = s.sub_reason.map(|r| format!(" ({r})")).unwrap_or_default();
            lines.push(format!("  Reason:         {reason}{sub}"));
        }
        if let Some(message) = &s.message {
            lines.push(format!("  Message:        {message}"));
        }
        if let Some(session) = &s.investigation_session {
            lines.push(format!(
                "  Session:        {} (generation {}, {} polls)",
                session.id, session.generation, session.poll_count
            ));
        }
        if let Some(root_cause) = &s.root_cause {
            lines.push(format!("  Root cause:     {}", root_cause.summary));
        }
        if let Some(workflow) = &s.selected_workflow {
            lines.push(format!(
                "  Workflow:       {} (confidence {:.2})",
                workflow.workflow_id, workflow.confidence
            ));
        }
        for alt in &s.alternative_workflows {
            lines.push(format!(
                "  Alternative:    {} ({:.2}) {}",
                alt.workflow_id, alt.confidence, alt.rationale
            ));
        }
        if let Some(ctx) = &s.approval_context {
            let required = if s.approval_required { "required" } else { "not required" };
            let degraded = if ctx.degraded { " [degraded]" } else { "" };
            lines.push(format!("  Approval:       {required}{degraded}: {}", ctx.reason));
        }
        if s.needs_human_review {
            lines.push(format!(
                "  Human review:   {}",
                s.human_review_reason.as_deref().unwrap_or("required")
            ));
        }
        for warning in &s.warnings {
            lines.push(format!("  Warning:        {warning}"));
        }
        if !s.conditions.is_empty() {
            lines.push("  Conditions:".to_string());
            for c in &s.conditions {
                lines.push(format!(
                    "    {:?}={} {}: {}",
                    c.condition_type, c.status, c.reason, c.message
                ));
            }
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.analysis).unwrap_or_default()
    }
}

pub async fn execute(args: StatusArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let repository = SqliteAnalysisRepository::new(open_database(&config).await?);

    if let Some(resource) = &args.resource {
        let key = ResourceKey::parse(resource)
            .with_context(|| format!("Invalid resource '{resource}', expected namespace/name"))?;
        let analysis = repository
            .get(&key)
            .await?
            .with_context(|| format!("Analysis {key} not found"))?;
        output(&AnalysisDetailOutput { analysis }, json_mode);
        return Ok(());
    }

    let phase = args
        .phase
        .as_deref()
        .map(|p| Phase::from_str(p).with_context(|| format!("Unknown phase '{p}'")))
        .transpose()?;
    let analyses = repository
        .list(AnalysisFilter {
            namespace: args.namespace,
            phase,
            non_terminal_only: false,
            limit: Some(args.limit),
        })
        .await?;

    let summaries: Vec<AnalysisSummary> = analyses.iter().map(AnalysisSummary::from).collect();
    let total = summaries.len();
    output(
        &AnalysisListOutput {
            analyses: summaries,
            total,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AnalysisRequest, Reason, SelectedWorkflow, SubReason, TargetResource,
    };
    use std::collections::BTreeMap;

    fn analysis() -> AIAnalysis {
        let spec = AnalysisRequest {
            remediation_id: "rr-7".to_string(),
            signal_fingerprint: "fp".to_string(),
            severity: "warning".to_string(),
            signal_name: "CrashLoop".to_string(),
            signal_type: "CrashLoopBackOff".to_string(),
            environment: "staging".to_string(),
            business_priority: "P2".to_string(),
            target_resource: TargetResource::new("Pod", "web-1"),
            enrichment: Default::default(),
            analysis_types: vec![],
            recovery: None,
        };
        AIAnalysis::new(ResourceKey::new("shop", "crash-1"), spec)
    }

    #[test]
    fn test_summary_of_completed_analysis() {
        let mut a = analysis();
        a.status.phase = Phase::Completed;
        a.status.reason = Some(Reason::AnalysisCompleted);
        a.status.selected_workflow = Some(SelectedWorkflow {
            workflow_id: "restart-pod".to_string(),
            version: None,
            container_image: None,
            parameters: BTreeMap::new(),
            confidence: 0.91,
            rationale: String::new(),
        });

        let summary = AnalysisSummary::from(&a);
        assert_eq!(summary.phase, "Completed");
        assert_eq!(summary.workflow.as_deref(), Some("restart-pod"));
        assert_eq!(summary.confidence, Some(0.91));

        let out = AnalysisListOutput {
            analyses: vec![summary],
            total: 1,
        };
        let human = out.to_human();
        assert!(human.starts_with("1 analysis:"));
        assert!(human.contains("restart-pod"));
        assert!(human.contains("0.91"));
    }

    #[test]
    fn test_summary_reason_includes_sub_reason() {
        let mut a = analysis();
        a.status.phase = Phase::Failed;
        a.status.reason = Some(Reason::WorkflowResolutionFailed);
        a.status.sub_reason = Some(SubReason::LowConfidence);
        let summary = AnalysisSummary::from(&a);
        assert_eq!(
            summary.reason.as_deref(),
            Some(format!("{}/{}", Reason::WorkflowResolutionFailed, SubReason::LowConfidence).as_str())
        );
    }

    #[test]
    fn test_detail_json_is_the_resource() {
        let a = analysis();
        let json = AnalysisDetailOutput { analysis: a.clone() }.to_json();
        assert_eq!(json["metadata"]["name"], "crash-1");
        assert_eq!(json["spec"]["remediation_id"], "rr-7");
        assert!(AnalysisDetailOutput { analysis: a }.to_human().contains("shop/crash-1"));
    }
}
