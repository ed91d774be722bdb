//! In-memory AnalysisRepository with the same concurrency contract as SQLite.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::models::{AIAnalysis, AnalysisStatus, ResourceKey};
use crate::domain::ports::{AnalysisFilter, AnalysisRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryAnalysisRepository {
    analyses: Arc<RwLock<HashMap<ResourceKey, AIAnalysis>>>,
}

impl InMemoryAnalysisRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryAnalysisRepository {
    async fn create(&self, analysis: &AIAnalysis) -> Result<(), RepositoryError> {
        let mut analyses = self.analyses.write().await;
        let key = analysis.key();
        if analyses.contains_key(&key) {
            return Err(RepositoryError::AlreadyExists(key));
        }
        analyses.insert(key, analysis.clone());
        Ok(())
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<AIAnalysis>, RepositoryError> {
        Ok(self.analyses.read().await.get(key).cloned())
    }

    async fn list(&self, filter: AnalysisFilter) -> Result<Vec<AIAnalysis>, RepositoryError> {
        let analyses = self.analyses.read().await;
        let mut found: Vec<AIAnalysis> = analyses
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            a.metadata
                .created_at
                .cmp(&b.metadata.created_at)
                .then_with(|| a.key().cmp(&b.key()))
        });
        if let Some(limit) = filter.limit {
            found.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(found)
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: &AnalysisStatus,
    ) -> Result<u64, RepositoryError> {
        let mut analyses = self.analyses.write().await;
        let analysis = analyses
            .get_mut(key)
            .ok_or_else(|| RepositoryError::NotFound(key.clone()))?;

        if analysis.metadata.resource_version != expected_version {
            return Err(RepositoryError::Conflict {
                key: key.clone(),
                expected: expected_version,
                actual: analysis.metadata.resource_version,
            });
        }

        analysis.status = status.clone();
        analysis.metadata.resource_version += 1;
        Ok(analysis.metadata.resource_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::analysis::fixtures;
    use crate::domain::models::Phase;
    use chrono::Utc;

    #[tokio::test]
    async fn test_conflict_on_stale_version() {
        let repo = InMemoryAnalysisRepository::new();
        let a = AIAnalysis::new(
            ResourceKey::new("default", "a1"),
            fixtures::request("OOMKilled", "staging"),
        );
        repo.create(&a).await.unwrap();

        let mut status = a.status.clone();
        status.transition_to(Phase::Investigating, Utc::now()).unwrap();
        assert_eq!(repo.update_status(&a.key(), 1, &status).await.unwrap(), 2);

        let err = repo.update_status(&a.key(), 1, &status).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict { actual: 2, .. }));
    }
}
