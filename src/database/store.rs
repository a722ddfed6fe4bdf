//! Storage seam for the enrichment pipeline
//!
//! Resolution, batch processing and ownership discovery only talk to
//! storage through [`EnrichmentStore`], so the algorithms can run against
//! Postgres in production and an in-memory store in tests.

use crate::models::{BatchStatus, Entity, EntityOwnership, EntityResolution};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Candidate to persist in `entity_resolutions`
#[derive(Debug, Clone)]
pub struct NewResolution {
    pub charity_number: Option<String>,
    pub company_number: Option<String>,
    pub candidate_name: String,
    pub candidate_data: Option<serde_json::Value>,
    pub confidence_score: f64,
    pub match_method: String,
}

/// Link to persist in `entity_ownerships`
#[derive(Debug, Clone)]
pub struct NewOwnership {
    pub owner_id: Uuid,
    pub owned_id: Uuid,
    pub ownership_type: String,
    pub ownership_percentage: Option<f64>,
    pub relationship_description: Option<String>,
    pub source: String,
    pub verified: bool,
}

/// Final counters written when a batch run ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub processed: i32,
    pub matched: i32,
    pub failed: i32,
}

impl BatchProgress {
    /// Terminal status for a finished run
    pub fn final_status(&self) -> BatchStatus {
        if self.failed > 0 && self.matched == 0 {
            BatchStatus::Failed
        } else if self.failed > 0 {
            BatchStatus::Partial
        } else {
            BatchStatus::Completed
        }
    }
}

#[async_trait]
pub trait EnrichmentStore: Send + Sync {
    // ==========================================
    // ENTITIES
    // ==========================================

    async fn get_entity(&self, entity_id: Uuid) -> Result<Option<Entity>>;

    /// Insert a newly discovered entity
    async fn insert_entity(&self, entity: &Entity) -> Result<()>;

    /// Persist every mutable column of `entity`
    async fn save_entity(&self, entity: &Entity) -> Result<()>;

    async fn pending_entities(&self, batch_id: Uuid) -> Result<Vec<Entity>>;

    /// Matched or confirmed entities at ownership level 0
    async fn resolved_root_entities(&self, batch_id: Uuid) -> Result<Vec<Entity>>;

    async fn find_by_company_number(
        &self,
        batch_id: Uuid,
        company_number: &str,
    ) -> Result<Option<Entity>>;

    async fn find_by_charity_number(
        &self,
        batch_id: Uuid,
        charity_number: &str,
    ) -> Result<Option<Entity>>;

    // ==========================================
    // RESOLUTION CANDIDATES
    // ==========================================

    async fn add_resolutions(
        &self,
        entity_id: Uuid,
        candidates: &[NewResolution],
    ) -> Result<Vec<EntityResolution>>;

    async fn clear_resolutions(&self, entity_id: Uuid) -> Result<()>;

    async fn get_resolution(
        &self,
        entity_id: Uuid,
        resolution_id: Uuid,
    ) -> Result<Option<EntityResolution>>;

    /// Mark `resolution_id` as the chosen candidate and clear the rest.
    /// `None` clears every selection for the entity.
    async fn select_resolution(&self, entity_id: Uuid, resolution_id: Option<Uuid>) -> Result<()>;

    // ==========================================
    // OWNERSHIP
    // ==========================================

    /// Insert unless the (owner, owned) pair already exists
    async fn upsert_ownership(&self, ownership: &NewOwnership) -> Result<()>;

    /// Links where `owned_id` is the owned side
    async fn owners_of(&self, owned_id: Uuid) -> Result<Vec<EntityOwnership>>;

    // ==========================================
    // BATCH PROGRESS
    // ==========================================

    async fn mark_batch_processing(&self, batch_id: Uuid) -> Result<()>;

    async fn finish_batch(&self, batch_id: Uuid, progress: BatchProgress) -> Result<()>;

    async fn fail_batch(&self, batch_id: Uuid, error_message: &str) -> Result<()>;
}
