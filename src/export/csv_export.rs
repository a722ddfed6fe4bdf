//! Flat CSV of a batch's entities

use anyhow::{Context, Result};

use crate::models::Entity;

pub const CSV_COLUMNS: [&str; 13] = [
    "Row Number",
    "Original Name",
    "Resolved Name",
    "Charity Number",
    "Company Number",
    "Entity Type",
    "Resolution Status",
    "Confidence",
    "Charity Status",
    "Address",
    "Website",
    "Latest Income",
    "Latest Expenditure",
];

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn record(entity: &Entity) -> [String; 13] {
    [
        opt(entity.row_number),
        entity.original_name.clone(),
        opt(entity.resolved_name.as_deref()),
        opt(entity.charity_number.as_deref()),
        opt(entity.company_number.as_deref()),
        entity.entity_type.to_string(),
        entity.resolution_status.to_string(),
        opt(entity.resolution_confidence),
        opt(entity.charity_status.as_deref()),
        opt(entity.address.as_deref()),
        opt(entity.website.as_deref()),
        opt(entity.latest_income),
        opt(entity.latest_expenditure),
    ]
}

pub fn build_csv(entities: &[Entity]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for entity in entities {
        writer
            .write_record(record(entity))
            .with_context(|| format!("Failed to write CSV row for entity {}", entity.id))?;
    }
    writer.into_inner().context("Failed to flush CSV output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolutionStatus;
    use uuid::Uuid;

    #[test]
    fn test_csv_header_and_rows() {
        let mut matched = Entity::new_pending(Uuid::new_v4(), "Oxfam, GB", None, Some(1));
        matched.resolved_name = Some("OXFAM".into());
        matched.charity_number = Some("202918".into());
        matched.resolution_status = ResolutionStatus::Matched;
        matched.resolution_confidence = Some(1.0);
        matched.latest_income = Some(1250.5);
        let pending = Entity::new_pending(Uuid::new_v4(), "Unknown Trust", None, Some(2));

        let bytes = build_csv(&[matched, pending]).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 13);
        assert_eq!(&headers[0], "Row Number");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "Oxfam, GB");
        assert_eq!(&rows[0][3], "202918");
        assert_eq!(&rows[0][6], "matched");
        assert_eq!(&rows[0][11], "1250.5");
        assert_eq!(&rows[1][2], "");
        assert_eq!(&rows[1][6], "pending");
    }
}
