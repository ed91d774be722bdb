//! CLI command implementations.

pub mod audit;
pub mod policy;
pub mod run;
pub mod status;
pub mod submit;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::sqlite::initialize_database;
use crate::adapters::{HttpAuditStore, SqliteAuditStore};
use crate::domain::models::Config;
use crate::domain::ports::AuditStore;
use crate::infrastructure::config::ConfigLoader;

/// Load the explicit config file if one was given, else the layered config.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ConfigLoader::load().context("Failed to load configuration"),
    }
}

pub(crate) async fn open_database(config: &Config) -> Result<SqlitePool> {
    initialize_database(&config.database)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))
}

/// The data storage service when configured, otherwise the local database.
pub(crate) fn audit_store(config: &Config, pool: SqlitePool) -> Result<Arc<dyn AuditStore>> {
    match config.audit.data_storage_url.as_deref() {
        Some(url) => {
            let store = HttpAuditStore::new(url, Duration::from_secs(config.audit.write_timeout_secs))?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(SqliteAuditStore::new(pool))),
    }
}
