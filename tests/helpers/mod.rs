//! In-process fakes for the storage and register seams

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use charity_enrich::charity_commission::{
    CharityDetails, CharitySummary, RegistrySource, Subsidiary, Trustee,
};
use charity_enrich::database::{BatchProgress, EnrichmentStore, NewOwnership, NewResolution};
use charity_enrich::models::{
    BatchStatus, Entity, EntityOwnership, EntityResolution, ResolutionStatus,
};
use charity_enrich::resolution::calculate_similarity;

// ============================================================================
// Register
// ============================================================================

/// Register backed by a fixed set of charities
#[derive(Default)]
pub struct FakeRegistry {
    charities: BTreeMap<String, CharityDetails>,
    subsidiaries: HashMap<String, Vec<Subsidiary>>,
    pub fail_searches: bool,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_charity(mut self, number: &str, name: &str, trustees: &[&str]) -> Self {
        self.charities.insert(
            number.to_string(),
            CharityDetails {
                charity_number: number.to_string(),
                name: Some(name.to_string()),
                status: Some("Registered".to_string()),
                latest_income: Some(1_000_000.0),
                latest_expenditure: Some(900_000.0),
                trustees: trustees
                    .iter()
                    .map(|t| Trustee {
                        name: t.to_string(),
                        id: None,
                    })
                    .collect(),
                ..CharityDetails::default()
            },
        );
        self
    }

    pub fn with_subsidiary(mut self, number: &str, name: &str, company_number: &str) -> Self {
        let sub = Subsidiary {
            name: name.to_string(),
            company_number: Some(company_number.to_string()),
        };
        self.subsidiaries
            .entry(number.to_string())
            .or_default()
            .push(sub.clone());
        if let Some(details) = self.charities.get_mut(number) {
            details.subsidiaries.push(sub);
        }
        self
    }

    pub fn into_arc(self) -> Arc<dyn RegistrySource> {
        Arc::new(self)
    }
}

#[async_trait]
impl RegistrySource for FakeRegistry {
    async fn search_charities(&self, query: &str, page_size: u32) -> Result<Vec<CharitySummary>> {
        if self.fail_searches {
            return Err(anyhow!("register unavailable"));
        }
        let needle = query.to_lowercase();
        Ok(self
            .charities
            .values()
            .filter_map(|c| {
                let name = c.name.clone().unwrap_or_default();
                let hit = calculate_similarity(query, &name) >= 0.5
                    || name.to_lowercase().contains(&needle);
                hit.then(|| CharitySummary {
                    charity_number: c.charity_number.clone(),
                    name: name.clone(),
                    status: c.status.clone(),
                    raw: json!({ "charityNumber": c.charity_number, "charityName": name }),
                })
            })
            .take(page_size as usize)
            .collect())
    }

    async fn get_full_charity_details(
        &self,
        charity_number: &str,
    ) -> Result<Option<CharityDetails>> {
        Ok(self.charities.get(charity_number).cloned())
    }

    async fn get_charity_subsidiaries(&self, charity_number: &str) -> Result<Vec<Subsidiary>> {
        Ok(self
            .subsidiaries
            .get(charity_number)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct Tables {
    entities: HashMap<Uuid, Entity>,
    resolutions: Vec<EntityResolution>,
    ownerships: Vec<EntityOwnership>,
    batches: HashMap<Uuid, (BatchStatus, Option<BatchProgress>, Option<String>)>,
}

/// `EnrichmentStore` over plain maps
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, entity: Entity) {
        self.tables
            .lock()
            .unwrap()
            .entities
            .insert(entity.id, entity);
    }

    pub fn entity(&self, id: Uuid) -> Entity {
        self.tables.lock().unwrap().entities[&id].clone()
    }

    pub fn entity_count(&self) -> usize {
        self.tables.lock().unwrap().entities.len()
    }

    pub fn entities_named(&self, name: &str) -> Vec<Entity> {
        self.tables
            .lock()
            .unwrap()
            .entities
            .values()
            .filter(|e| e.display_name() == name)
            .cloned()
            .collect()
    }

    pub fn resolutions(&self, entity_id: Uuid) -> Vec<EntityResolution> {
        self.tables
            .lock()
            .unwrap()
            .resolutions
            .iter()
            .filter(|r| r.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub fn ownerships(&self) -> Vec<EntityOwnership> {
        self.tables.lock().unwrap().ownerships.clone()
    }

    pub fn batch(&self, batch_id: Uuid) -> Option<(BatchStatus, Option<BatchProgress>, Option<String>)> {
        self.tables.lock().unwrap().batches.get(&batch_id).cloned()
    }
}

#[async_trait]
impl EnrichmentStore for InMemoryStore {
    async fn get_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
        Ok(self.tables.lock().unwrap().entities.get(&entity_id).cloned())
    }

    async fn insert_entity(&self, entity: &Entity) -> Result<()> {
        self.put(entity.clone());
        Ok(())
    }

    async fn save_entity(&self, entity: &Entity) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.entities.contains_key(&entity.id) {
            return Err(anyhow!("entity {} does not exist", entity.id));
        }
        tables.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    async fn pending_entities(&self, batch_id: Uuid) -> Result<Vec<Entity>> {
        let tables = self.tables.lock().unwrap();
        let mut pending: Vec<Entity> = tables
            .entities
            .values()
            .filter(|e| e.batch_id == batch_id && e.resolution_status == ResolutionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.row_number);
        Ok(pending)
    }

    async fn resolved_root_entities(&self, batch_id: Uuid) -> Result<Vec<Entity>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .entities
            .values()
            .filter(|e| {
                e.batch_id == batch_id
                    && e.ownership_level == 0
                    && e.resolution_status.is_resolved()
            })
            .cloned()
            .collect())
    }

    async fn find_by_company_number(
        &self,
        batch_id: Uuid,
        company_number: &str,
    ) -> Result<Option<Entity>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .entities
            .values()
            .find(|e| e.batch_id == batch_id && e.company_number.as_deref() == Some(company_number))
            .cloned())
    }

    async fn find_by_charity_number(
        &self,
        batch_id: Uuid,
        charity_number: &str,
    ) -> Result<Option<Entity>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .entities
            .values()
            .find(|e| e.batch_id == batch_id && e.charity_number.as_deref() == Some(charity_number))
            .cloned())
    }

    async fn add_resolutions(
        &self,
        entity_id: Uuid,
        candidates: &[NewResolution],
    ) -> Result<Vec<EntityResolution>> {
        let rows: Vec<EntityResolution> = candidates
            .iter()
            .map(|c| EntityResolution {
                id: Uuid::new_v4(),
                entity_id,
                charity_number: c.charity_number.clone(),
                company_number: c.company_number.clone(),
                candidate_name: c.candidate_name.clone(),
                candidate_data: c.candidate_data.clone(),
                confidence_score: c.confidence_score,
                match_method: c.match_method.clone(),
                is_selected: false,
                created_at: Utc::now(),
            })
            .collect();
        self.tables
            .lock()
            .unwrap()
            .resolutions
            .extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn clear_resolutions(&self, entity_id: Uuid) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .resolutions
            .retain(|r| r.entity_id != entity_id);
        Ok(())
    }

    async fn get_resolution(
        &self,
        entity_id: Uuid,
        resolution_id: Uuid,
    ) -> Result<Option<EntityResolution>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .resolutions
            .iter()
            .find(|r| r.entity_id == entity_id && r.id == resolution_id)
            .cloned())
    }

    async fn select_resolution(&self, entity_id: Uuid, resolution_id: Option<Uuid>) -> Result<()> {
        for r in self.tables.lock().unwrap().resolutions.iter_mut() {
            if r.entity_id == entity_id {
                r.is_selected = Some(r.id) == resolution_id;
            }
        }
        Ok(())
    }

    async fn upsert_ownership(&self, ownership: &NewOwnership) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let exists = tables
            .ownerships
            .iter()
            .any(|o| o.owner_id == ownership.owner_id && o.owned_id == ownership.owned_id);
        if !exists {
            let now = Utc::now();
            tables.ownerships.push(EntityOwnership {
                id: Uuid::new_v4(),
                owner_id: ownership.owner_id,
                owned_id: ownership.owned_id,
                ownership_type: ownership.ownership_type.clone(),
                ownership_percentage: ownership.ownership_percentage,
                relationship_description: ownership.relationship_description.clone(),
                source: ownership.source.clone(),
                verified: ownership.verified,
                created_at: now,
                updated_at: now,
            });
        }
        Ok(())
    }

    async fn owners_of(&self, owned_id: Uuid) -> Result<Vec<EntityOwnership>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .ownerships
            .iter()
            .filter(|o| o.owned_id == owned_id)
            .cloned()
            .collect())
    }

    async fn mark_batch_processing(&self, batch_id: Uuid) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .batches
            .insert(batch_id, (BatchStatus::Processing, None, None));
        Ok(())
    }

    async fn finish_batch(&self, batch_id: Uuid, progress: BatchProgress) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .batches
            .insert(batch_id, (progress.final_status(), Some(progress), None));
        Ok(())
    }

    async fn fail_batch(&self, batch_id: Uuid, error_message: &str) -> Result<()> {
        self.tables.lock().unwrap().batches.insert(
            batch_id,
            (BatchStatus::Failed, None, Some(error_message.to_string())),
        );
        Ok(())
    }
}

/// A pending upload row
pub fn pending(batch_id: Uuid, name: &str, row: i32) -> Entity {
    Entity::new_pending(batch_id, name, None, Some(row))
}
