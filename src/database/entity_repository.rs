//! Entities, their resolution candidates and ownership links

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

use super::batch_repository::BatchRepository;
use super::store::{BatchProgress, EnrichmentStore, NewOwnership, NewResolution};
use super::Page;
use crate::models::{Entity, EntityOwnership, EntityResolution, ResolutionStatus};

const ENTITY_COLUMNS: &str = r#"
    id, batch_id, original_name, original_data, row_number, entity_type,
    resolved_name, charity_number, company_number, charity_status,
    charity_registration_date, charity_removal_date, charity_activities,
    contact_email, contact_phone, website, address,
    latest_income, latest_expenditure, latest_financial_year_end,
    resolution_status, resolution_confidence, resolution_method,
    parent_entity_id, ownership_level, enriched_data,
    created_at, updated_at, resolved_at
"#;

const RESOLUTION_COLUMNS: &str = r#"
    id, entity_id, charity_number, company_number, candidate_name, candidate_data,
    confidence_score, match_method, is_selected, created_at
"#;

const OWNERSHIP_COLUMNS: &str = r#"
    id, owner_id, owned_id, ownership_type, ownership_percentage,
    relationship_description, source, verified, created_at, updated_at
"#;

/// Listing filters for a batch's entities
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub status: Option<ResolutionStatus>,
    /// Case-insensitive substring of the original or resolved name
    pub search: Option<String>,
}

/// Aggregates for one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub matched: i64,
    pub total_income: f64,
    pub total_expenditure: f64,
}

/// Candidate row joined with the name of the entity it was proposed for
#[derive(Debug, Clone, FromRow)]
pub struct BatchResolutionRow {
    pub entity_name: String,
    #[sqlx(flatten)]
    pub resolution: EntityResolution,
}

pub struct EntityRepository {
    pool: PgPool,
}

/// Escape LIKE wildcards so user text matches literally under `ESCAPE '\'`
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl EntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==========================================
    // ENTITIES
    // ==========================================

    pub async fn get(&self, entity_id: Uuid) -> Result<Option<Entity>> {
        let sql = format!("SELECT {} FROM entities WHERE id = $1", ENTITY_COLUMNS);
        sqlx::query_as::<_, Entity>(&sql)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch entity")
    }

    /// Entity whose batch belongs to `user_id`
    pub async fn get_for_user(&self, entity_id: Uuid, user_id: Uuid) -> Result<Option<Entity>> {
        let sql = format!(
            r#"
            SELECT {} FROM entities
            WHERE id = $1
              AND batch_id IN (SELECT id FROM entity_batches WHERE user_id = $2)
            "#,
            ENTITY_COLUMNS
        );
        sqlx::query_as::<_, Entity>(&sql)
            .bind(entity_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch entity")
    }

    /// Insert the row, then write every enrichment column
    pub async fn insert(&self, entity: &Entity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entities (id, batch_id, original_name, original_data, row_number)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entity.id)
        .bind(entity.batch_id)
        .bind(&entity.original_name)
        .bind(&entity.original_data)
        .bind(entity.row_number)
        .execute(&self.pool)
        .await
        .context("Failed to insert entity")?;

        self.save(entity).await?;
        debug!(entity_id = %entity.id, name = %entity.original_name, "Inserted entity");
        Ok(())
    }

    /// Write back every mutable column
    pub async fn save(&self, entity: &Entity) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entities SET
                entity_type = $2,
                resolved_name = $3,
                charity_number = $4,
                company_number = $5,
                charity_status = $6,
                charity_registration_date = $7,
                charity_removal_date = $8,
                charity_activities = $9,
                contact_email = $10,
                contact_phone = $11,
                website = $12,
                address = $13,
                latest_income = $14,
                latest_expenditure = $15,
                latest_financial_year_end = $16,
                resolution_status = $17,
                resolution_confidence = $18,
                resolution_method = $19,
                parent_entity_id = $20,
                ownership_level = $21,
                enriched_data = $22,
                resolved_at = $23,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(entity.id)
        .bind(entity.entity_type.as_str())
        .bind(&entity.resolved_name)
        .bind(&entity.charity_number)
        .bind(&entity.company_number)
        .bind(&entity.charity_status)
        .bind(entity.charity_registration_date)
        .bind(entity.charity_removal_date)
        .bind(&entity.charity_activities)
        .bind(&entity.contact_email)
        .bind(&entity.contact_phone)
        .bind(&entity.website)
        .bind(&entity.address)
        .bind(entity.latest_income)
        .bind(entity.latest_expenditure)
        .bind(entity.latest_financial_year_end)
        .bind(entity.resolution_status.as_str())
        .bind(entity.resolution_confidence)
        .bind(&entity.resolution_method)
        .bind(entity.parent_entity_id)
        .bind(entity.ownership_level)
        .bind(&entity.enriched_data)
        .bind(entity.resolved_at)
        .execute(&self.pool)
        .await
        .context("Failed to save entity")?;
        Ok(())
    }

    pub async fn with_status(&self, batch_id: Uuid, status: ResolutionStatus) -> Result<Vec<Entity>> {
        let sql = format!(
            r#"
            SELECT {} FROM entities
            WHERE batch_id = $1 AND resolution_status = $2
            ORDER BY row_number NULLS LAST, created_at
            "#,
            ENTITY_COLUMNS
        );
        sqlx::query_as::<_, Entity>(&sql)
            .bind(batch_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch entities by status")
    }

    /// Every entity of a batch, source rows first then discovered ones
    pub async fn all_for_batch(&self, batch_id: Uuid) -> Result<Vec<Entity>> {
        let sql = format!(
            r#"
            SELECT {} FROM entities
            WHERE batch_id = $1
            ORDER BY ownership_level, row_number NULLS LAST, created_at
            "#,
            ENTITY_COLUMNS
        );
        sqlx::query_as::<_, Entity>(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch batch entities")
    }

    pub async fn resolved_roots(&self, batch_id: Uuid) -> Result<Vec<Entity>> {
        let sql = format!(
            r#"
            SELECT {} FROM entities
            WHERE batch_id = $1 AND ownership_level = 0
              AND resolution_status IN ('matched', 'confirmed')
            ORDER BY row_number NULLS LAST
            "#,
            ENTITY_COLUMNS
        );
        sqlx::query_as::<_, Entity>(&sql)
            .bind(batch_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch resolved entities")
    }

    async fn find_by_column(
        &self,
        batch_id: Uuid,
        column: &'static str,
        value: &str,
    ) -> Result<Option<Entity>> {
        let sql = format!(
            "SELECT {} FROM entities WHERE batch_id = $1 AND {} = $2 ORDER BY created_at LIMIT 1",
            ENTITY_COLUMNS, column
        );
        sqlx::query_as::<_, Entity>(&sql)
            .bind(batch_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to find entity by {}", column))
    }

    pub async fn list(
        &self,
        batch_id: Uuid,
        filter: &EntityFilter,
        page: i64,
        page_size: i64,
    ) -> Result<Page<Entity>> {
        let status = filter.status.map(|s| s.as_str());
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        let offset = (page.max(1) - 1) * page_size;

        const WHERE: &str = r#"
            WHERE batch_id = $1
              AND ($2::text IS NULL OR resolution_status = $2)
              AND ($3::text IS NULL OR original_name ILIKE $3 ESCAPE '\' OR resolved_name ILIKE $3 ESCAPE '\')
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM entities {}", WHERE))
            .bind(batch_id)
            .bind(status)
            .bind(&search)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count entities")?;

        let sql = format!(
            "SELECT {} FROM entities {} ORDER BY ownership_level, row_number NULLS LAST, created_at LIMIT $4 OFFSET $5",
            ENTITY_COLUMNS, WHERE
        );
        let items = sqlx::query_as::<_, Entity>(&sql)
            .bind(batch_id)
            .bind(status)
            .bind(&search)
            .bind(page_size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list entities")?;

        Ok(Page::new(items, total, page.max(1), page_size))
    }

    pub async fn stats(&self, batch_id: Uuid) -> Result<EntityStats> {
        let by_status: Vec<(String, i64)> = sqlx::query_as(
            "SELECT resolution_status, COUNT(*) FROM entities WHERE batch_id = $1 GROUP BY resolution_status",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to count entities by status")?;

        let by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT entity_type, COUNT(*) FROM entities WHERE batch_id = $1 GROUP BY entity_type",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to count entities by type")?;

        let (total_income, total_expenditure): (Option<f64>, Option<f64>) = sqlx::query_as(
            "SELECT SUM(latest_income), SUM(latest_expenditure) FROM entities WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum entity financials")?;

        let mut stats = EntityStats {
            total_income: total_income.unwrap_or(0.0),
            total_expenditure: total_expenditure.unwrap_or(0.0),
            ..EntityStats::default()
        };
        for (status, count) in by_status {
            stats.total += count;
            if status
                .parse::<ResolutionStatus>()
                .map(|s| s.is_resolved())
                .unwrap_or(false)
            {
                stats.matched += count;
            }
            stats.by_status.insert(status, count);
        }
        stats.by_type = by_type.into_iter().collect();
        Ok(stats)
    }

    /// Put no_match and rejected rows back to pending and drop their old
    /// candidates. Returns the entity count.
    pub async fn reset_unresolved(&self, batch_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            DELETE FROM entity_resolutions
            WHERE entity_id IN (
                SELECT id FROM entities
                WHERE batch_id = $1 AND resolution_status IN ('no_match', 'rejected')
            )
            "#,
        )
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear stale resolution candidates")?;

        let result = sqlx::query(
            r#"
            UPDATE entities
            SET resolution_status = 'pending', resolution_confidence = NULL,
                resolution_method = NULL, resolved_at = NULL, updated_at = NOW()
            WHERE batch_id = $1 AND resolution_status IN ('no_match', 'rejected')
            "#,
        )
        .bind(batch_id)
        .execute(&mut *tx)
        .await
        .context("Failed to reset unresolved entities")?;

        tx.commit().await.context("Failed to commit reset")?;
        Ok(result.rows_affected())
    }

    // ==========================================
    // RESOLUTION CANDIDATES
    // ==========================================

    pub async fn add_resolutions(
        &self,
        entity_id: Uuid,
        candidates: &[NewResolution],
    ) -> Result<Vec<EntityResolution>> {
        let sql = format!(
            r#"
            INSERT INTO entity_resolutions (
                id, entity_id, charity_number, company_number, candidate_name,
                candidate_data, confidence_score, match_method
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            RESOLUTION_COLUMNS
        );

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut saved = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let row = sqlx::query_as::<_, EntityResolution>(&sql)
                .bind(Uuid::new_v4())
                .bind(entity_id)
                .bind(&candidate.charity_number)
                .bind(&candidate.company_number)
                .bind(&candidate.candidate_name)
                .bind(&candidate.candidate_data)
                .bind(candidate.confidence_score)
                .bind(&candidate.match_method)
                .fetch_one(&mut *tx)
                .await
                .context("Failed to save resolution candidate")?;
            saved.push(row);
        }
        tx.commit().await.context("Failed to commit resolution candidates")?;
        Ok(saved)
    }

    pub async fn clear_resolutions(&self, entity_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM entity_resolutions WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete resolution candidates")?;
        Ok(())
    }

    pub async fn get_resolution(
        &self,
        entity_id: Uuid,
        resolution_id: Uuid,
    ) -> Result<Option<EntityResolution>> {
        let sql = format!(
            "SELECT {} FROM entity_resolutions WHERE id = $1 AND entity_id = $2",
            RESOLUTION_COLUMNS
        );
        sqlx::query_as::<_, EntityResolution>(&sql)
            .bind(resolution_id)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch resolution candidate")
    }

    /// Best first
    pub async fn resolutions_for_entity(&self, entity_id: Uuid) -> Result<Vec<EntityResolution>> {
        let sql = format!(
            "SELECT {} FROM entity_resolutions WHERE entity_id = $1 ORDER BY confidence_score DESC",
            RESOLUTION_COLUMNS
        );
        sqlx::query_as::<_, EntityResolution>(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch resolution candidates")
    }

    pub async fn resolutions_for_batch(&self, batch_id: Uuid) -> Result<Vec<BatchResolutionRow>> {
        sqlx::query_as::<_, BatchResolutionRow>(
            r#"
            SELECT e.original_name AS entity_name,
                   r.id, r.entity_id, r.charity_number, r.company_number, r.candidate_name,
                   r.candidate_data, r.confidence_score, r.match_method, r.is_selected, r.created_at
            FROM entity_resolutions r
            JOIN entities e ON e.id = r.entity_id
            WHERE e.batch_id = $1
            ORDER BY e.row_number NULLS LAST, r.confidence_score DESC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch batch resolution candidates")
    }

    pub async fn select_resolution(
        &self,
        entity_id: Uuid,
        resolution_id: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE entity_resolutions
            SET is_selected = COALESCE(id = $2, FALSE)
            WHERE entity_id = $1
            "#,
        )
        .bind(entity_id)
        .bind(resolution_id)
        .execute(&self.pool)
        .await
        .context("Failed to select resolution candidate")?;
        Ok(())
    }

    // ==========================================
    // OWNERSHIP
    // ==========================================

    pub async fn upsert_ownership(&self, ownership: &NewOwnership) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_ownerships (
                id, owner_id, owned_id, ownership_type, ownership_percentage,
                relationship_description, source, verified
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (owner_id, owned_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ownership.owner_id)
        .bind(ownership.owned_id)
        .bind(&ownership.ownership_type)
        .bind(ownership.ownership_percentage)
        .bind(&ownership.relationship_description)
        .bind(&ownership.source)
        .bind(ownership.verified)
        .execute(&self.pool)
        .await
        .context("Failed to save ownership link")?;
        Ok(())
    }

    pub async fn owners_of(&self, owned_id: Uuid) -> Result<Vec<EntityOwnership>> {
        let sql = format!(
            "SELECT {} FROM entity_ownerships WHERE owned_id = $1 ORDER BY created_at",
            OWNERSHIP_COLUMNS
        );
        sqlx::query_as::<_, EntityOwnership>(&sql)
            .bind(owned_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch owners")
    }
}

/// Postgres-backed [`EnrichmentStore`]
pub struct PgStore {
    pub entities: EntityRepository,
    pub batches: BatchRepository,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            entities: EntityRepository::new(pool.clone()),
            batches: BatchRepository::new(pool),
        }
    }
}

#[async_trait]
impl EnrichmentStore for PgStore {
    async fn get_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
        self.entities.get(entity_id).await
    }

    async fn insert_entity(&self, entity: &Entity) -> Result<()> {
        self.entities.insert(entity).await
    }

    async fn save_entity(&self, entity: &Entity) -> Result<()> {
        self.entities.save(entity).await
    }

    async fn pending_entities(&self, batch_id: Uuid) -> Result<Vec<Entity>> {
        self.entities
            .with_status(batch_id, ResolutionStatus::Pending)
            .await
    }

    async fn resolved_root_entities(&self, batch_id: Uuid) -> Result<Vec<Entity>> {
        self.entities.resolved_roots(batch_id).await
    }

    async fn find_by_company_number(
        &self,
        batch_id: Uuid,
        company_number: &str,
    ) -> Result<Option<Entity>> {
        self.entities
            .find_by_column(batch_id, "company_number", company_number)
            .await
    }

    async fn find_by_charity_number(
        &self,
        batch_id: Uuid,
        charity_number: &str,
    ) -> Result<Option<Entity>> {
        self.entities
            .find_by_column(batch_id, "charity_number", charity_number)
            .await
    }

    async fn add_resolutions(
        &self,
        entity_id: Uuid,
        candidates: &[NewResolution],
    ) -> Result<Vec<EntityResolution>> {
        self.entities.add_resolutions(entity_id, candidates).await
    }

    async fn clear_resolutions(&self, entity_id: Uuid) -> Result<()> {
        self.entities.clear_resolutions(entity_id).await
    }

    async fn get_resolution(
        &self,
        entity_id: Uuid,
        resolution_id: Uuid,
    ) -> Result<Option<EntityResolution>> {
        self.entities.get_resolution(entity_id, resolution_id).await
    }

    async fn select_resolution(&self, entity_id: Uuid, resolution_id: Option<Uuid>) -> Result<()> {
        self.entities.select_resolution(entity_id, resolution_id).await
    }

    async fn upsert_ownership(&self, ownership: &NewOwnership) -> Result<()> {
        self.entities.upsert_ownership(ownership).await
    }

    async fn owners_of(&self, owned_id: Uuid) -> Result<Vec<EntityOwnership>> {
        self.entities.owners_of(owned_id).await
    }

    async fn mark_batch_processing(&self, batch_id: Uuid) -> Result<()> {
        self.batches.mark_processing(batch_id).await
    }

    async fn finish_batch(&self, batch_id: Uuid, progress: BatchProgress) -> Result<()> {
        self.batches.finish(batch_id, progress).await
    }

    async fn fail_batch(&self, batch_id: Uuid, error_message: &str) -> Result<()> {
        self.batches.fail(batch_id, error_message).await
    }
}
