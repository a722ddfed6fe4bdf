//! Batches, entities, candidate resolutions and ownership links

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    /// Processing state of an uploaded batch
    BatchStatus, "batch status" {
        Uploaded => "uploaded",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Partial => "partial",
    }
}

text_enum! {
    /// Kind of organisation an entity turned out to be
    EntityType, "entity type" {
        Charity => "charity",
        Company => "company",
        Trust => "trust",
        Cio => "cio",
        Unknown => "unknown",
    }
}

text_enum! {
    /// Outcome of matching an entity against the register
    ResolutionStatus, "resolution status" {
        Pending => "pending",
        Matched => "matched",
        MultipleMatches => "multiple_matches",
        NoMatch => "no_match",
        ManualReview => "manual_review",
        Confirmed => "confirmed",
        Rejected => "rejected",
    }
}

impl ResolutionStatus {
    /// Matched automatically or confirmed by a user
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionStatus::Matched | ResolutionStatus::Confirmed)
    }
}

/// An uploaded file of entity names
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityBatch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub original_filename: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: BatchStatus,
    pub total_records: i32,
    pub processed_records: i32,
    pub matched_records: i32,
    pub failed_records: i32,
    pub error_message: Option<String>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityBatch {
    /// Percentage of records matched, 0 when the batch is empty
    pub fn match_rate(&self) -> f64 {
        if self.total_records > 0 {
            self.matched_records as f64 / self.total_records as f64 * 100.0
        } else {
            0.0
        }
    }
}

/// One row of a batch, enriched once resolved
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entity {
    pub id: Uuid,
    pub batch_id: Uuid,

    // Source row
    pub original_name: String,
    pub original_data: Option<serde_json::Value>,
    pub row_number: Option<i32>,

    #[sqlx(try_from = "String")]
    pub entity_type: EntityType,

    // Register data
    pub resolved_name: Option<String>,
    pub charity_number: Option<String>,
    pub company_number: Option<String>,
    pub charity_status: Option<String>,
    pub charity_registration_date: Option<NaiveDate>,
    pub charity_removal_date: Option<NaiveDate>,
    pub charity_activities: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub website: Option<String>,
    pub address: Option<String>,
    pub latest_income: Option<f64>,
    pub latest_expenditure: Option<f64>,
    pub latest_financial_year_end: Option<NaiveDate>,

    // Resolution
    #[sqlx(try_from = "String")]
    pub resolution_status: ResolutionStatus,
    pub resolution_confidence: Option<f64>,
    pub resolution_method: Option<String>,

    // Ownership
    pub parent_entity_id: Option<Uuid>,
    pub ownership_level: i32,

    /// Trustees, subsidiaries and the last built ownership tree
    pub enriched_data: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Entity {
    /// A fresh, unresolved row as created from an upload
    pub fn new_pending(
        batch_id: Uuid,
        original_name: impl Into<String>,
        original_data: Option<serde_json::Value>,
        row_number: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            batch_id,
            original_name: original_name.into(),
            original_data,
            row_number,
            entity_type: EntityType::Unknown,
            resolved_name: None,
            charity_number: None,
            company_number: None,
            charity_status: None,
            charity_registration_date: None,
            charity_removal_date: None,
            charity_activities: None,
            contact_email: None,
            contact_phone: None,
            website: None,
            address: None,
            latest_income: None,
            latest_expenditure: None,
            latest_financial_year_end: None,
            resolution_status: ResolutionStatus::Pending,
            resolution_confidence: None,
            resolution_method: None,
            parent_entity_id: None,
            ownership_level: 0,
            enriched_data: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// Resolved name when known, otherwise the uploaded one
    pub fn display_name(&self) -> &str {
        self.resolved_name.as_deref().unwrap_or(&self.original_name)
    }

    /// Trustee names recorded in `enriched_data.trustees`
    pub fn trustee_names(&self) -> Vec<String> {
        self.enriched_list("trustees")
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Array stored under `key` in `enriched_data`, empty if absent
    pub fn enriched_list(&self, key: &str) -> Vec<serde_json::Value> {
        self.enriched_data
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    }

    /// Set or replace one key of `enriched_data`, creating the object if needed
    pub fn set_enriched(&mut self, key: &str, value: serde_json::Value) {
        let mut data = match self.enriched_data.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        data.insert(key.to_string(), value);
        self.enriched_data = Some(serde_json::Value::Object(data));
    }
}

/// A register candidate considered for an entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityResolution {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub charity_number: Option<String>,
    pub company_number: Option<String>,
    pub candidate_name: String,
    pub candidate_data: Option<serde_json::Value>,
    pub confidence_score: f64,
    pub match_method: String,
    pub is_selected: bool,
    pub created_at: DateTime<Utc>,
}

/// Directed owner -> owned link discovered while building trees
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityOwnership {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owned_id: Uuid,
    pub ownership_type: String,
    pub ownership_percentage: Option<f64>,
    pub relationship_description: Option<String>,
    pub source: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_text_roundtrip() {
        for status in ResolutionStatus::ALL {
            let parsed: ResolutionStatus = status.as_str().parse().unwrap();
            assert_eq!(&parsed, status);
        }
        assert_eq!(
            "Multiple_Matches".parse::<ResolutionStatus>().unwrap(),
            ResolutionStatus::MultipleMatches
        );
        assert!("maybe".parse::<ResolutionStatus>().is_err());
    }

    #[test]
    fn test_serde_matches_stored_text() {
        let v = serde_json::to_value(ResolutionStatus::NoMatch).unwrap();
        assert_eq!(v, json!("no_match"));
        let v = serde_json::to_value(EntityType::Cio).unwrap();
        assert_eq!(v, json!("cio"));
    }

    #[test]
    fn test_enriched_helpers() {
        let mut e = Entity::new_pending(Uuid::new_v4(), "Oxfam", None, Some(1));
        assert!(e.trustee_names().is_empty());

        e.set_enriched(
            "trustees",
            json!([{"name": "Jane Doe", "id": 1}, {"name": "  "}, {"id": 3}]),
        );
        e.set_enriched("subsidiaries", json!([]));
        assert_eq!(e.trustee_names(), vec!["Jane Doe".to_string()]);
        assert!(e.enriched_list("subsidiaries").is_empty());
        assert_eq!(e.display_name(), "Oxfam");
    }

    #[test]
    fn test_match_rate() {
        let now = Utc::now();
        let mut batch = EntityBatch {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "b".into(),
            description: None,
            original_filename: None,
            status: BatchStatus::Completed,
            total_records: 0,
            processed_records: 0,
            matched_records: 0,
            failed_records: 0,
            error_message: None,
            processing_started_at: None,
            processing_completed_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(batch.match_rate(), 0.0);
        batch.total_records = 4;
        batch.matched_records = 3;
        assert!((batch.match_rate() - 75.0).abs() < f64::EPSILON);
    }
}
