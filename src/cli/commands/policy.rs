//! `aianalysis policy`: approval policy tooling.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::commands::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::services::{ApprovalPolicy, CompiledPolicy};

#[derive(Args, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommands,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Validate an approval policy file
    Check {
        /// Policy file (YAML)
        file: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct PolicyCheckOutput {
    pub path: String,
    pub valid: bool,
    pub production_environments: Vec<String>,
    pub auto_approve_environments: Vec<String>,
    pub production_auto_approve_confidence: f64,
    pub max_recovery_attempts_before_approval: u32,
    pub sensitive_kinds: Vec<String>,
    pub approval_required_custom_labels: Vec<String>,
}

impl PolicyCheckOutput {
    fn new(path: &Path, policy: &ApprovalPolicy, compiled: &CompiledPolicy) -> Self {
        Self {
            path: path.display().to_string(),
            valid: true,
            production_environments: policy.production_environments.clone(),
            auto_approve_environments: policy.auto_approve_environments.clone(),
            production_auto_approve_confidence: compiled.production_auto_approve_confidence(),
            max_recovery_attempts_before_approval: policy.max_recovery_attempts_before_approval,
            sensitive_kinds: policy.sensitive_kinds.clone(),
            approval_required_custom_labels: policy
                .approval_required_custom_labels
                .keys()
                .cloned()
                .collect(),
        }
    }
}

fn list_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "(none)".to_string()
    } else {
        values.join(", ")
    }
}

impl CommandOutput for PolicyCheckOutput {
    fn to_human(&self) -> String {
        [
            format!("Policy {} is valid", self.path),
            format!("  Production environments:   {}", list_or_none(&self.production_environments)),
            format!("  Auto-approve environments: {}", list_or_none(&self.auto_approve_environments)),
            format!(
                "  Production confidence:     {:.2}",
                self.production_auto_approve_confidence
            ),
            format!(
                "  Recovery escalation at:    attempt {}",
                self.max_recovery_attempts_before_approval
            ),
            format!("  Sensitive kinds:           {}", list_or_none(&self.sensitive_kinds)),
            format!(
                "  Approval labels:           {}",
                list_or_none(&self.approval_required_custom_labels)
            ),
        ]
        .join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Parse and compile `path` the way the controller would load it.
pub fn check_policy(path: &Path, default_production_confidence: f64) -> Result<PolicyCheckOutput> {
    let policy = ApprovalPolicy::load_file(path)?;
    let compiled = CompiledPolicy::compile(&policy, default_production_confidence)
        .with_context(|| format!("Policy {} failed validation", path.display()))?;
    Ok(PolicyCheckOutput::new(path, &policy, &compiled))
}

pub async fn execute(args: PolicyArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    match args.command {
        PolicyCommands::Check { file } => {
            let config = load_config(config_path)?;
            let result = check_policy(&file, config.policy.production_auto_approve_confidence)?;
            output(&result, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn policy_file(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_policy() {
        let file = policy_file(
            "production_environments: [prod]\n\
             auto_approve_environments: [staging]\n\
             approval_required_custom_labels:\n  team: [payments]\n",
        );
        let out = check_policy(file.path(), 0.8).unwrap();
        assert!(out.valid);
        assert_eq!(out.production_environments, vec!["prod"]);
        assert!((out.production_auto_approve_confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(out.approval_required_custom_labels, vec!["team"]);
        assert!(out.to_human().contains("is valid"));
    }

    #[test]
    fn test_policy_threshold_overrides_default() {
        let file = policy_file("production_auto_approve_confidence: 0.9\n");
        let out = check_policy(file.path(), 0.8).unwrap();
        assert!((out.production_auto_approve_confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overlapping_environments_rejected() {
        let file = policy_file(
            "production_environments: [prod]\nauto_approve_environments: [prod]\n",
        );
        let err = check_policy(file.path(), 0.8).unwrap_err();
        assert!(format!("{err:#}").contains("both production and auto-approve"));
    }

    #[test]
    fn test_unparseable_policy_rejected() {
        let file = policy_file("production_environments: {not: [a list\n");
        assert!(check_policy(file.path(), 0.8).is_err());
    }

    #[test]
    fn test_missing_file_rejected() {
        assert!(check_policy(Path::new("/nonexistent/policy.yaml"), 0.8).is_err());
    }
}
