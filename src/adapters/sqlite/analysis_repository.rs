//! SQLite implementation of the AnalysisRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::parse_datetime;
use crate::domain::models::{AIAnalysis, AnalysisStatus, ObjectMeta, Phase, ResourceKey};
use crate::domain::ports::{AnalysisFilter, AnalysisRepository, RepositoryError};

const SELECT_COLUMNS: &str =
    "SELECT namespace, name, uid, spec, status, resource_version, created_at FROM analyses";

#[derive(Clone)]
pub struct SqliteAnalysisRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, key: &ResourceKey) -> Result<Option<u64>, RepositoryError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT resource_version FROM analyses WHERE namespace = ? AND name = ?")
                .bind(&key.namespace)
                .bind(&key.name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| to_version(v)))
    }
}

#[async_trait]
impl AnalysisRepository for SqliteAnalysisRepository {
    async fn create(&self, analysis: &AIAnalysis) -> Result<(), RepositoryError> {
        let spec_json = serde_json::to_string(&analysis.spec)?;
        let status_json = serde_json::to_string(&analysis.status)?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"INSERT INTO analyses (namespace, name, uid, spec, status, phase, resource_version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&analysis.metadata.namespace)
        .bind(&analysis.metadata.name)
        .bind(analysis.metadata.uid.to_string())
        .bind(&spec_json)
        .bind(&status_json)
        .bind(analysis.phase().as_str())
        .bind(from_version(analysis.metadata.resource_version))
        .bind(analysis.metadata.created_at.to_rfc3339())
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::AlreadyExists(analysis.key()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<AIAnalysis>, RepositoryError> {
        let row: Option<AnalysisRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE namespace = ? AND name = ?"))
                .bind(&key.namespace)
                .bind(&key.name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: AnalysisFilter) -> Result<Vec<AIAnalysis>, RepositoryError> {
        let mut query = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(namespace) = &filter.namespace {
            query.push_str(" AND namespace = ?");
            bindings.push(namespace.clone());
        }

        if let Some(phase) = filter.phase {
            query.push_str(" AND phase = ?");
            bindings.push(phase.as_str().to_string());
        }

        if filter.non_terminal_only {
            query.push_str(" AND phase NOT IN (?, ?)");
            bindings.push(Phase::Completed.as_str().to_string());
            bindings.push(Phase::Failed.as_str().to_string());
        }

        query.push_str(" ORDER BY created_at ASC, namespace ASC, name ASC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut q = sqlx::query_as::<_, AnalysisRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<AnalysisRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn update_status(
        &self,
        key: &ResourceKey,
        expected_version: u64,
        status: &AnalysisStatus,
    ) -> Result<u64, RepositoryError> {
        let status_json = serde_json::to_string(status)?;

        let result = sqlx::query(
            r#"UPDATE analyses
               SET status = ?, phase = ?, resource_version = resource_version + 1, updated_at = ?
               WHERE namespace = ? AND name = ? AND resource_version = ?"#,
        )
        .bind(&status_json)
        .bind(status.phase.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(from_version(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(expected_version + 1);
        }

        match self.current_version(key).await? {
            None => Err(RepositoryError::NotFound(key.clone())),
            Some(actual) => Err(RepositoryError::Conflict {
                key: key.clone(),
                expected: expected_version,
                actual,
            }),
        }
    }
}

#[allow(clippy::cast_sign_loss)]
fn to_version(v: i64) -> u64 {
    v.max(0) as u64
}

#[allow(clippy::cast_possible_wrap)]
fn from_version(v: u64) -> i64 {
    v as i64
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    namespace: String,
    name: String,
    uid: String,
    spec: String,
    status: String,
    resource_version: i64,
    created_at: String,
}

impl TryFrom<AnalysisRow> for AIAnalysis {
    type Error = RepositoryError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(Self {
            metadata: ObjectMeta {
                name: row.name,
                namespace: row.namespace,
                uid: Uuid::parse_str(&row.uid)?,
                created_at: parse_datetime(&row.created_at)?,
                resource_version: to_version(row.resource_version),
            },
            spec: serde_json::from_str(&row.spec)?,
            status: serde_json::from_str(&row.status)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::analysis::fixtures;

    async fn setup_test_repo() -> SqliteAnalysisRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteAnalysisRepository::new(pool)
    }

    fn analysis(name: &str) -> AIAnalysis {
        AIAnalysis::new(
            ResourceKey::new("default", name),
            fixtures::request("OOMKilled", "staging"),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_analysis() {
        let repo = setup_test_repo().await;
        let a = analysis("a1");
        repo.create(&a).await.unwrap();

        let retrieved = repo.get(&a.key()).await.unwrap().unwrap();
        assert_eq!(retrieved.metadata.uid, a.metadata.uid);
        assert_eq!(retrieved.spec, a.spec);
        assert_eq!(retrieved.phase(), Phase::Pending);
        assert_eq!(retrieved.metadata.resource_version, 1);

        assert!(repo.get(&ResourceKey::new("default", "missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let repo = setup_test_repo().await;
        let a = analysis("a1");
        repo.create(&a).await.unwrap();

        let err = repo.create(&analysis("a1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_update_status_bumps_version() {
        let repo = setup_test_repo().await;
        let a = analysis("a1");
        repo.create(&a).await.unwrap();

        let mut status = a.status.clone();
        status.transition_to(Phase::Investigating, Utc::now()).unwrap();
        let version = repo.update_status(&a.key(), 1, &status).await.unwrap();
        assert_eq!(version, 2);

        let retrieved = repo.get(&a.key()).await.unwrap().unwrap();
        assert_eq!(retrieved.phase(), Phase::Investigating);
        assert_eq!(retrieved.metadata.resource_version, 2);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts_without_writing() {
        let repo = setup_test_repo().await;
        let a = analysis("a1");
        repo.create(&a).await.unwrap();

        let mut first = a.status.clone();
        first.transition_to(Phase::Investigating, Utc::now()).unwrap();
        repo.update_status(&a.key(), 1, &first).await.unwrap();

        let mut stale = a.status.clone();
        stale.transition_to(Phase::Failed, Utc::now()).unwrap();
        let err = repo.update_status(&a.key(), 1, &stale).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));

        let retrieved = repo.get(&a.key()).await.unwrap().unwrap();
        assert_eq!(retrieved.phase(), Phase::Investigating);
    }

    #[tokio::test]
    async fn test_update_missing_analysis() {
        let repo = setup_test_repo().await;
        let err = repo
            .update_status(&ResourceKey::new("default", "ghost"), 1, &AnalysisStatus::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_non_terminal() {
        let repo = setup_test_repo().await;
        let open = analysis("open");
        let done = analysis("done");
        repo.create(&open).await.unwrap();
        repo.create(&done).await.unwrap();

        let mut status = done.status.clone();
        status.transition_to(Phase::Failed, Utc::now()).unwrap();
        repo.update_status(&done.key(), 1, &status).await.unwrap();

        let all = repo.list(AnalysisFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = repo.list(AnalysisFilter::non_terminal()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].metadata.name, "open");

        let failed = repo
            .list(AnalysisFilter {
                phase: Some(Phase::Failed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].metadata.name, "done");
    }
}
