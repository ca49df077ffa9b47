//! Postgres-backed document store

use async_trait::async_trait;
use paperless_common::DocumentId;
use sqlx::PgPool;
use tracing::instrument;

use super::{DbResult, Document, DocumentStore};

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a metadata row the way the upload endpoint does.
    pub async fn insert(&self, file_name: &str, byte_size: i64) -> DbResult<Document> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (file_name, byte_size)
            VALUES ($1, $2)
            RETURNING id, file_name, byte_size, summary, created_at, last_modified
            "#,
        )
        .bind(file_name)
        .bind(byte_size)
        .fetch_one(&self.pool)
        .await?;

        Ok(document)
    }

    #[instrument(skip(self), fields(document_id = %id))]
    pub async fn find(&self, id: DocumentId) -> DbResult<Option<Document>> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, file_name, byte_size, summary, created_at, last_modified
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self, summary), fields(document_id = %id))]
    async fn update_summary(&self, id: DocumentId, summary: &str) -> DbResult<bool> {
        let updated = sqlx::query_scalar::<_, i32>(
            "UPDATE documents SET summary = $1 WHERE id = $2 RETURNING id",
        )
        .bind(summary)
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated.is_some())
    }
}
