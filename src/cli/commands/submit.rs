//! `aianalysis submit`: admit an analysis from a YAML manifest.

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::adapters::SqliteAnalysisRepository;
use crate::cli::commands::{load_config, open_database};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{AIAnalysis, AnalysisRequest, ResourceKey};
use crate::domain::ports::AnalysisRepository;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Analysis manifest (YAML with name, namespace and spec)
    pub file: PathBuf,
}

/// On-disk shape of a submitted analysis.
#[derive(Debug, Deserialize)]
pub struct AnalysisManifest {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub spec: AnalysisRequest,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl AnalysisManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml).context("Invalid analysis manifest")?;
        if manifest.name.trim().is_empty() || manifest.namespace.trim().is_empty() {
            anyhow::bail!("Analysis manifest needs a non-empty name and namespace");
        }
        manifest.spec.validate().context("Invalid analysis request")?;
        Ok(manifest)
    }

    pub fn into_analysis(self) -> AIAnalysis {
        AIAnalysis::new(ResourceKey::new(self.namespace, self.name), self.spec)
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitOutput {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub correlation_id: String,
    pub phase: String,
}

impl From<&AIAnalysis> for SubmitOutput {
    fn from(analysis: &AIAnalysis) -> Self {
        Self {
            namespace: analysis.metadata.namespace.clone(),
            name: analysis.metadata.name.clone(),
            uid: analysis.metadata.uid.to_string(),
            correlation_id: analysis.correlation_id(),
            phase: analysis.phase().to_string(),
        }
    }
}

impl CommandOutput for SubmitOutput {
    fn to_human(&self) -> String {
        format!(
            "Analysis {}/{} created\n  UID:            {}\n  Correlation ID: {}\n  Phase:          {}",
            self.namespace, self.name, self.uid, self.correlation_id, self.phase
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: SubmitArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let yaml = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let analysis = AnalysisManifest::from_yaml(&yaml)?.into_analysis();

    let config = load_config(config_path)?;
    let repository = SqliteAnalysisRepository::new(open_database(&config).await?);
    repository
        .create(&analysis)
        .await
        .with_context(|| format!("Failed to create analysis {}", analysis.key()))?;

    output(&SubmitOutput::from(&analysis), json_mode);
    Ok(())
}
