use async_trait::async_trait;

use crate::domain::models::{AIAnalysis, AnalysisStatus, Phase, ResourceKey};
use crate::domain::ports::errors::RepositoryError;

/// Filters for listing analyses
#[derive(Default, Debug, Clone)]
pub struct AnalysisFilter {
    pub namespace: Option<String>,
    pub phase: Option<Phase>,
    /// Only analyses that have not reached Completed or Failed
    pub non_terminal_only: bool,
    pub limit: Option<i64>,
}

impl AnalysisFilter {
    pub fn non_terminal() -> Self {
        Self {
            non_terminal_only: true,
            ..Default::default()
        }
    }

    pub fn matches(&self, analysis: &AIAnalysis) -> bool {
        if let Some(ns) = &self.namespace {
            if &analysis.metadata.namespace != ns {
                return false;
            }
        }
        if let Some(phase) = self.phase {
            if analysis.phase() != phase {
                return false;
            }
        }
        !(self.non_terminal_only && analysis.phase().is_terminal())
    }
}

/// Repository port for analysis resources.
///
/// Status is only ever written through [`update_status`], which compares
/// the caller's `expected_version` with the stored resource version.
///
/// [`update_status`]: AnalysisRepository::update_status
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// Insert a new analysis; fails with `AlreadyExists` on a duplicate key
    async fn create(&self, analysis: &AIAnalysis) -> Result<(), RepositoryError>;

    /// Get an analysis by key
    async fn get(&self, key: &ResourceKey) -> Result<Option<AIAnalysis>, RepositoryError>;

    /// List analyses, oldest first
    async fn list(&self, filter: AnalysisFilter) -> Result<Vec<AIAnalysis>, RepositoryError>;

    /// Replace the status if the stored version still equals
    /// `expected_version`. Returns the new resource version.
    async fn update_status(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: &AnalysisStatus,
    ) -> Result<u64, RepositoryError>;
}
