//! Entity batches

use anyhow::{anyhow, Context, Result};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::store::BatchProgress;
use super::Page;
use crate::models::{BatchStatus, Entity, EntityBatch};

pub(crate) const BATCH_COLUMNS: &str = r#"
    id, user_id, name, description, original_filename, status,
    total_records, processed_records, matched_records, failed_records,
    error_message, processing_started_at, processing_completed_at,
    created_at, updated_at
"#;

pub struct BatchRepository {
    pool: PgPool,
}

impl BatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a batch and its entity rows in one transaction
    pub async fn create_with_entities(
        &self,
        batch_id: Uuid,
        user_id: Uuid,
        name: &str,
        description: Option<&str>,
        original_filename: Option<&str>,
        entities: &[Entity],
    ) -> Result<EntityBatch> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let sql = format!(
            r#"
            INSERT INTO entity_batches (id, user_id, name, description, original_filename, status, total_records)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            BATCH_COLUMNS
        );
        let batch = sqlx::query_as::<_, EntityBatch>(&sql)
            .bind(batch_id)
            .bind(user_id)
            .bind(name)
            .bind(description)
            .bind(original_filename)
            .bind(BatchStatus::Uploaded.as_str())
            .bind(entities.len() as i32)
            .fetch_one(&mut *tx)
            .await
            .context("Failed to create batch")?;

        for entity in entities {
            if entity.batch_id != batch_id {
                return Err(anyhow!("Entity {} does not belong to batch {}", entity.id, batch_id));
            }
            sqlx::query(
                r#"
                INSERT INTO entities (id, batch_id, original_name, original_data, row_number,
                                      entity_type, resolution_status, ownership_level)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entity.id)
            .bind(entity.batch_id)
            .bind(&entity.original_name)
            .bind(&entity.original_data)
            .bind(entity.row_number)
            .bind(entity.entity_type.as_str())
            .bind(entity.resolution_status.as_str())
            .bind(entity.ownership_level)
            .execute(&mut *tx)
            .await
            .context("Failed to create entity")?;
        }

        tx.commit().await.context("Failed to commit batch")?;

        info!(batch_id = %batch.id, records = batch.total_records, "Created batch");
        Ok(batch)
    }

    pub async fn get(&self, batch_id: Uuid) -> Result<Option<EntityBatch>> {
        let sql = format!("SELECT {} FROM entity_batches WHERE id = $1", BATCH_COLUMNS);
        sqlx::query_as::<_, EntityBatch>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch batch")
    }

    /// Batch owned by `user_id`, `None` if missing or foreign
    pub async fn get_for_user(&self, batch_id: Uuid, user_id: Uuid) -> Result<Option<EntityBatch>> {
        let sql = format!(
            "SELECT {} FROM entity_batches WHERE id = $1 AND user_id = $2",
            BATCH_COLUMNS
        );
        sqlx::query_as::<_, EntityBatch>(&sql)
            .bind(batch_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch batch")
    }

    /// Newest first
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        status: Option<BatchStatus>,
        page: i64,
        page_size: i64,
    ) -> Result<Page<EntityBatch>> {
        let status = status.map(|s| s.as_str());
        let offset = (page.max(1) - 1) * page_size;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM entity_batches
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count batches")?;

        let sql = format!(
            r#"
            SELECT {} FROM entity_batches
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            BATCH_COLUMNS
        );
        let items = sqlx::query_as::<_, EntityBatch>(&sql)
            .bind(user_id)
            .bind(status)
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list batches")?;

        Ok(Page::new(items, total, page.max(1), page_size))
    }

    /// Delete a batch; entities, candidates and links cascade
    pub async fn delete(&self, batch_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM entity_batches WHERE id = $1")
            .bind(batch_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete batch")?;

        if result.rows_affected() == 0 {
            return Err(anyhow!("Batch not found: {}", batch_id));
        }

        info!(batch_id = %batch_id, "Deleted batch");
        Ok(())
    }

    pub async fn mark_processing(&self, batch_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entity_batches
            SET status = $2, processing_started_at = NOW(), error_message = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(BatchStatus::Processing.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to mark batch processing")?;
        Ok(())
    }

    pub async fn finish(&self, batch_id: Uuid, progress: BatchProgress) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entity_batches
            SET status = $2,
                processed_records = $3,
                matched_records = $4,
                failed_records = $5,
                processing_completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(progress.final_status().as_str())
        .bind(progress.processed)
        .bind(progress.matched)
        .bind(progress.failed)
        .execute(&self.pool)
        .await
        .context("Failed to finish batch")?;
        Ok(())
    }

    pub async fn fail(&self, batch_id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entity_batches
            SET status = $2, error_message = $3, processing_completed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(BatchStatus::Failed.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await
        .context("Failed to mark batch failed")?;
        Ok(())
    }
}
