//! Batch exports: styled xlsx workbook and flat CSV

pub mod csv_export;
pub mod workbook;

use anyhow::Result;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::database::{BatchRepository, BatchResolutionRow, EntityRepository};
use crate::models::{Entity, EntityBatch};

pub use csv_export::build_csv;
pub use workbook::build_workbook;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

const MAX_FILENAME_LEN: usize = 100;

/// Which optional sheets to include in a workbook
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub include_resolutions: bool,
    pub include_ownership: bool,
    pub include_financial: bool,
    pub include_trustees: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_resolutions: true,
            include_ownership: true,
            include_financial: true,
            include_trustees: true,
        }
    }
}

/// Everything a workbook is rendered from
#[derive(Debug, Clone)]
pub struct ExportData {
    pub batch: EntityBatch,
    pub entities: Vec<Entity>,
    pub resolutions: Vec<BatchResolutionRow>,
}

/// Rendered export ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`, truncated
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_LEN)
        .collect()
}

pub struct ExportService {
    entities: EntityRepository,
    batches: BatchRepository,
}

impl ExportService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            entities: EntityRepository::new(pool.clone()),
            batches: BatchRepository::new(pool),
        }
    }

    /// `None` when the batch does not exist
    pub async fn export_batch_to_excel(
        &self,
        batch_id: Uuid,
        options: ExportOptions,
    ) -> Result<Option<ExportFile>> {
        let Some(batch) = self.batches.get(batch_id).await? else {
            return Ok(None);
        };

        let entities = self.entities.all_for_batch(batch_id).await?;
        let resolutions = if options.include_resolutions {
            self.entities.resolutions_for_batch(batch_id).await?
        } else {
            Vec::new()
        };

        let filename = format!("{}_export.xlsx", sanitize_filename(&batch.name));
        let data = ExportData {
            batch,
            entities,
            resolutions,
        };
        let bytes = build_workbook(&data, &options)?;

        info!(
            batch_id = %batch_id,
            entities = data.entities.len(),
            size = bytes.len(),
            "Exported batch to Excel"
        );
        Ok(Some(ExportFile {
            filename,
            content_type: XLSX_CONTENT_TYPE,
            bytes,
        }))
    }

    pub async fn export_batch_to_csv(&self, batch_id: Uuid) -> Result<Option<ExportFile>> {
        let Some(batch) = self.batches.get(batch_id).await? else {
            return Ok(None);
        };

        let entities = self.entities.all_for_batch(batch_id).await?;
        let bytes = build_csv(&entities)?;

        info!(batch_id = %batch_id, entities = entities.len(), "Exported batch to CSV");
        Ok(Some(ExportFile {
            filename: format!("{}_export.csv", sanitize_filename(&batch.name)),
            content_type: CSV_CONTENT_TYPE,
            bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::workbook::ENTITY_COLUMNS;
    use crate::models::{BatchStatus, ResolutionStatus};
    use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
    use chrono::Utc;
    use std::io::Cursor;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Q3 charities/2024.xlsx"), "Q3_charities_2024_xlsx");
        assert_eq!(sanitize_filename("ok-name_1"), "ok-name_1");
        assert_eq!(sanitize_filename("café"), "caf_");
        assert_eq!(sanitize_filename(&"a".repeat(150)).len(), 100);
    }

    #[test]
    fn test_options_default_to_everything() {
        let opts: ExportOptions = serde_json::from_str(r#"{"include_financial": false}"#).unwrap();
        assert!(opts.include_resolutions && opts.include_ownership && opts.include_trustees);
        assert!(!opts.include_financial);
    }

    fn sample_data() -> ExportData {
        let now = Utc::now();
        let batch = EntityBatch {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Grants 2024".into(),
            description: None,
            original_filename: Some("grants.csv".into()),
            status: BatchStatus::Completed,
            total_records: 2,
            processed_records: 2,
            matched_records: 1,
            failed_records: 0,
            error_message: None,
            processing_started_at: Some(now),
            processing_completed_at: Some(now),
            created_at: now,
            updated_at: now,
        };

        let mut matched = Entity::new_pending(batch.id, "Oxfam", None, Some(1));
        matched.resolution_status = ResolutionStatus::Matched;
        matched.charity_number = Some("202918".into());
        matched.latest_income = Some(100.0);
        matched.latest_expenditure = Some(80.0);
        matched.set_enriched(
            "trustees",
            serde_json::json!([{"name": "Jane Doe", "id": 7}]),
        );
        let mut sub = Entity::new_pending(batch.id, "Oxfam Trading", None, None);
        sub.parent_entity_id = Some(matched.id);
        sub.ownership_level = 1;
        sub.resolution_method = Some("subsidiary_discovery".into());

        ExportData {
            batch,
            entities: vec![matched, sub],
            resolutions: Vec::new(),
        }
    }

    fn open(bytes: Vec<u8>) -> Xlsx<Cursor<Vec<u8>>> {
        open_workbook_from_rs(Cursor::new(bytes)).unwrap()
    }

    fn text(range: &Range<Data>, row: u32, col: u32) -> String {
        match range.get_value((row, col)) {
            Some(Data::String(s)) => s.clone(),
            Some(Data::Float(f)) => f.to_string(),
            _ => String::new(),
        }
    }

    /// Value cell next to a "Label:" cell on the summary sheet
    fn summary_value(range: &Range<Data>, label: &str) -> Option<String> {
        range.rows().find_map(|row| match (row.first(), row.get(1)) {
            (Some(Data::String(l)), Some(Data::String(v))) if l == label => Some(v.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_workbook_has_every_sheet_by_default() {
        let bytes = build_workbook(&sample_data(), &ExportOptions::default()).unwrap();
        assert!(bytes.starts_with(b"PK"));

        let mut workbook = open(bytes);
        assert_eq!(
            workbook.sheet_names(),
            vec![
                "Summary",
                "Entities",
                "Resolution Candidates",
                "Ownership Tree",
                "Financial Data",
                "Enriched Data",
            ]
        );

        let entities = workbook.worksheet_range("Entities").unwrap();
        let header: Vec<String> = (0..ENTITY_COLUMNS.len() as u32)
            .map(|col| text(&entities, 0, col))
            .collect();
        assert_eq!(header, ENTITY_COLUMNS);
        assert_eq!(text(&entities, 1, 1), "Oxfam");
        assert_eq!(text(&entities, 1, 3), "202918");
        assert_eq!(text(&entities, 2, 1), "Oxfam Trading");

        let summary = workbook.worksheet_range("Summary").unwrap();
        assert!(text(&summary, 0, 0).contains("Grants 2024"));
        assert_eq!(summary_value(&summary, "Total Records:").as_deref(), Some("2"));
        assert_eq!(summary_value(&summary, "Matched:").as_deref(), Some("1"));
        assert_eq!(summary_value(&summary, "Match Rate:").as_deref(), Some("50.0%"));

        let enriched = workbook.worksheet_range("Enriched Data").unwrap();
        assert!(enriched
            .rows()
            .flatten()
            .any(|c| matches!(c, Data::String(s) if s == "Jane Doe")));
    }

    #[test]
    fn test_workbook_skips_disabled_sheets() {
        let options = ExportOptions {
            include_resolutions: false,
            include_ownership: false,
            include_financial: false,
            include_trustees: false,
        };
        let bytes = build_workbook(&sample_data(), &options).unwrap();
        assert_eq!(open(bytes).sheet_names(), vec!["Summary", "Entities"]);

        let options = ExportOptions {
            include_financial: false,
            ..ExportOptions::default()
        };
        let bytes = build_workbook(&sample_data(), &options).unwrap();
        let names = open(bytes).sheet_names();
        assert!(!names.iter().any(|n| n == "Financial Data"));
        assert!(names.iter().any(|n| n == "Ownership Tree"));
    }
}
