//! Document metadata persistence
//!
//! The pipeline's only write to the system of record is the summary column.
//! [`DocumentStore`] exposes exactly that.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperless_common::DocumentId;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::{parse_or, require, ConfigResult};

pub mod documents;
pub mod memory;

pub use documents::PgDocumentStore;
pub use memory::MemoryDocumentStore;

pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = Result<T, DbError>;

/// Persisted metadata for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Document {
    pub id: i32,
    pub file_name: String,
    pub byte_size: i64,
    /// Empty until the pipeline completes for this document.
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Overwrite the summary of one document in a single statement, leaving
    /// every other column alone. Returns `false` when no such document exists.
    async fn update_summary(&self, id: DocumentId, summary: &str) -> DbResult<bool>;
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    /// Apply the bundled migrations on startup.
    pub run_migrations: bool,
}

impl DbConfig {
    /// `DATABASE_URL` is required.
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            url: require("DATABASE_URL")?,
            max_connections: parse_or("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            min_connections: parse_or("DB_MIN_CONNECTIONS", DEFAULT_DB_MIN_CONNECTIONS)?,
            connect_timeout_secs: parse_or("DB_CONNECT_TIMEOUT", DEFAULT_DB_CONNECT_TIMEOUT_SECS)?,
            run_migrations: parse_or("DATABASE_RUN_MIGRATIONS", false)?,
        })
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            min_connections: DEFAULT_DB_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
            run_migrations: false,
        }
    }
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations completed");
    Ok(())
}
