//! Single-entity resolution
//!
//! Resolution order:
//! 1. Direct lookup of an already known charity number
//! 2. Charity number extracted from the name or the source row
//! 3. Fuzzy name search, committing only near-exact matches

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{calculate_similarity, DEFAULT_MAX_CANDIDATES, EXACT_MATCH_THRESHOLD};
use crate::charity_commission::{extract_charity_number, CharityDetails, RegistrySource};
use crate::database::{EnrichmentStore, NewResolution};
use crate::error::ResolutionError;
use crate::models::{Entity, EntityType, ResolutionStatus};

pub const METHOD_DIRECT_LOOKUP: &str = "direct_lookup";
pub const METHOD_NUMBER_EXTRACTION: &str = "number_extraction";
pub const METHOD_FUZZY_SEARCH: &str = "fuzzy_search";
pub const METHOD_EXACT_MATCH: &str = "exact_match";
pub const METHOD_MANUAL_CONFIRM: &str = "manual_confirm";

/// A register hit scored against the searched name
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub charity_number: String,
    pub name: String,
    pub status: Option<String>,
    pub similarity_score: f64,
    pub raw_data: Value,
}

/// Copy register details onto `entity` and mark it matched
pub fn apply_match(entity: &mut Entity, details: &CharityDetails, confidence: f64, method: &str) {
    entity.entity_type = EntityType::Charity;
    entity.resolved_name = details.name.clone();
    entity.charity_number = Some(details.charity_number.clone()).filter(|n| !n.is_empty());
    entity.charity_status = details.status.clone();
    entity.charity_registration_date = details.registration_date;
    entity.charity_removal_date = details.removal_date;
    entity.charity_activities = details.activities.clone();
    entity.contact_email = details.contact_email.clone();
    entity.contact_phone = details.contact_phone.clone();
    entity.website = details.website.clone();
    entity.address = details.address.clone();
    entity.latest_income = details.latest_income;
    entity.latest_expenditure = details.latest_expenditure;
    entity.latest_financial_year_end = details.financial_year_end;

    entity.resolution_status = ResolutionStatus::Matched;
    entity.resolution_confidence = Some(confidence);
    entity.resolution_method = Some(method.to_string());
    entity.resolved_at = Some(Utc::now());

    entity.set_enriched("trustees", json!(details.trustees));
    entity.set_enriched("subsidiaries", json!(details.subsidiaries));
}

/// Resolves entities against the register and persists the outcome
pub struct EntityResolver {
    store: Arc<dyn EnrichmentStore>,
    registry: Arc<dyn RegistrySource>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn EnrichmentStore>, registry: Arc<dyn RegistrySource>) -> Self {
        Self { store, registry }
    }

    /// Search the register and score hits, best first.
    ///
    /// Register failures are logged and yield no candidates.
    pub async fn search_candidates(&self, name: &str, max_results: usize) -> Vec<ScoredCandidate> {
        let hits = match self
            .registry
            .search_charities(name, (max_results * 2) as u32)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                error!(entity_name = name, error = %e, "Error searching candidates");
                return Vec::new();
            }
        };

        let mut candidates: Vec<ScoredCandidate> = hits
            .into_iter()
            .take(max_results)
            .map(|hit| ScoredCandidate {
                similarity_score: calculate_similarity(name, &hit.name),
                charity_number: hit.charity_number,
                name: hit.name,
                status: hit.status,
                raw_data: hit.raw,
            })
            .collect();

        candidates.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        candidates
    }

    /// Resolve `entity` in place and persist it.
    ///
    /// Register errors propagate; the caller decides how to record them.
    pub async fn resolve_entity(&self, entity: &mut Entity) -> anyhow::Result<()> {
        self.resolve_in_place(entity).await?;
        self.store.save_entity(entity).await?;
        info!(
            entity_id = %entity.id,
            status = %entity.resolution_status,
            method = entity.resolution_method.as_deref().unwrap_or("-"),
            "Resolved entity"
        );
        Ok(())
    }

    async fn resolve_in_place(&self, entity: &mut Entity) -> anyhow::Result<()> {
        // 1. Known number
        if let Some(number) = entity.charity_number.clone().filter(|n| !n.trim().is_empty()) {
            if let Some(details) = self.registry.get_full_charity_details(&number).await? {
                apply_match(entity, &details, 1.0, METHOD_DIRECT_LOOKUP);
                return Ok(());
            }
        }

        // 2. Number embedded in the name or the source row
        if let Some(number) = embedded_charity_number(entity) {
            if let Some(details) = self.registry.get_full_charity_details(&number).await? {
                apply_match(entity, &details, 0.95, METHOD_NUMBER_EXTRACTION);
                return Ok(());
            }
        }

        // 3. Fuzzy search
        let candidates = self
            .search_candidates(&entity.original_name, DEFAULT_MAX_CANDIDATES)
            .await;

        // A reprocessed entity may still carry candidates from an earlier run
        self.store.clear_resolutions(entity.id).await?;

        let Some(best) = candidates.first().cloned() else {
            entity.resolution_status = ResolutionStatus::NoMatch;
            entity.resolution_confidence = Some(0.0);
            entity.resolved_at = Some(Utc::now());
            return Ok(());
        };

        let rows: Vec<NewResolution> = candidates
            .iter()
            .map(|c| NewResolution {
                charity_number: Some(c.charity_number.clone()),
                company_number: None,
                candidate_name: c.name.clone(),
                candidate_data: Some(c.raw_data.clone()),
                confidence_score: c.similarity_score,
                match_method: METHOD_FUZZY_SEARCH.to_string(),
            })
            .collect();
        let saved = self.store.add_resolutions(entity.id, &rows).await?;

        if best.similarity_score >= EXACT_MATCH_THRESHOLD {
            if let Some(details) = self
                .registry
                .get_full_charity_details(&best.charity_number)
                .await?
            {
                apply_match(entity, &details, best.similarity_score, METHOD_EXACT_MATCH);
                self.store
                    .select_resolution(entity.id, saved.first().map(|r| r.id))
                    .await?;
                return Ok(());
            }
        }

        entity.resolution_status = if candidates.len() > 1 {
            ResolutionStatus::MultipleMatches
        } else {
            ResolutionStatus::ManualReview
        };
        entity.resolution_confidence = Some(best.similarity_score);
        entity.resolved_at = Some(Utc::now());
        debug!(
            entity_id = %entity.id,
            candidates = candidates.len(),
            best_score = best.similarity_score,
            "Queued for manual review"
        );
        Ok(())
    }

    /// Confirm a candidate, set a number by hand, or reject the entity.
    ///
    /// With neither `resolution_id` nor `charity_number` the entity is rejected.
    pub async fn confirm_resolution(
        &self,
        entity_id: Uuid,
        resolution_id: Option<Uuid>,
        charity_number: Option<String>,
    ) -> Result<Entity, ResolutionError> {
        let mut entity = self
            .store
            .get_entity(entity_id)
            .await?
            .ok_or(ResolutionError::EntityNotFound(entity_id))?;

        let mut number = charity_number.filter(|n| !n.trim().is_empty());
        let mut selected = None;
        if let Some(resolution_id) = resolution_id {
            let candidate = self
                .store
                .get_resolution(entity_id, resolution_id)
                .await?
                .ok_or(ResolutionError::CandidateNotFound(resolution_id))?;
            number = candidate.charity_number.or(number);
            selected = Some(candidate.id);
        }

        match number {
            Some(number) => {
                let details = self
                    .registry
                    .get_full_charity_details(&number)
                    .await?
                    .ok_or_else(|| ResolutionError::CharityNotFound(number.clone()))?;
                apply_match(&mut entity, &details, 1.0, METHOD_MANUAL_CONFIRM);
                entity.resolution_status = ResolutionStatus::Confirmed;
                self.store.select_resolution(entity_id, selected).await?;
            }
            None => {
                entity.resolution_status = ResolutionStatus::Rejected;
                entity.resolved_at = Some(Utc::now());
            }
        }

        self.store.save_entity(&entity).await?;
        info!(entity_id = %entity_id, status = %entity.resolution_status, "Resolution confirmed");
        Ok(entity)
    }

    /// Drop previous candidates, reset to pending and resolve again
    pub async fn re_resolve(&self, entity_id: Uuid) -> Result<Entity, ResolutionError> {
        let mut entity = self
            .store
            .get_entity(entity_id)
            .await?
            .ok_or(ResolutionError::EntityNotFound(entity_id))?;

        self.store.clear_resolutions(entity_id).await?;
        entity.resolution_status = ResolutionStatus::Pending;
        entity.resolution_confidence = None;
        entity.resolution_method = None;
        entity.resolved_at = None;

        self.resolve_entity(&mut entity).await?;
        Ok(entity)
    }
}

/// Charity number found in the name, else in any string cell of the source row
fn embedded_charity_number(entity: &Entity) -> Option<String> {
    extract_charity_number(&entity.original_name).or_else(|| {
        entity
            .original_data
            .as_ref()
            .and_then(|d| d.as_object())
            .and_then(|row| {
                row.values()
                    .filter_map(|v| v.as_str())
                    .find_map(extract_charity_number)
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charity_commission::Trustee;
    use chrono::NaiveDate;

    #[test]
    fn test_apply_match_copies_register_fields() {
        let mut entity = Entity::new_pending(Uuid::new_v4(), "Oxfam GB", None, Some(1));
        let details = CharityDetails {
            charity_number: "202918".into(),
            name: Some("OXFAM".into()),
            status: Some("Registered".into()),
            registration_date: NaiveDate::from_ymd_opt(1962, 1, 1),
            website: Some("https://www.oxfam.org.uk".into()),
            latest_income: Some(1_000.0),
            trustees: vec![Trustee {
                name: "A Trustee".into(),
                id: None,
            }],
            ..CharityDetails::default()
        };

        apply_match(&mut entity, &details, 0.97, METHOD_EXACT_MATCH);

        assert_eq!(entity.entity_type, EntityType::Charity);
        assert_eq!(entity.resolution_status, ResolutionStatus::Matched);
        assert_eq!(entity.charity_number.as_deref(), Some("202918"));
        assert_eq!(entity.resolved_name.as_deref(), Some("OXFAM"));
        assert_eq!(entity.resolution_confidence, Some(0.97));
        assert_eq!(entity.resolution_method.as_deref(), Some("exact_match"));
        assert!(entity.resolved_at.is_some());
        assert_eq!(entity.trustee_names(), vec!["A Trustee".to_string()]);
        assert!(entity.enriched_list("subsidiaries").is_empty());
    }

    #[test]
    fn test_embedded_number_prefers_name() {
        let row = json!({"name": "Oxfam", "ref": "Reg 220949", "count": 3});
        let mut entity = Entity::new_pending(Uuid::new_v4(), "Oxfam (202918)", Some(row), None);
        assert_eq!(embedded_charity_number(&entity).as_deref(), Some("202918"));

        entity.original_name = "Oxfam".into();
        assert_eq!(embedded_charity_number(&entity).as_deref(), Some("220949"));

        entity.original_data = None;
        assert_eq!(embedded_charity_number(&entity), None);
    }
}
