//! Turn CSV and Excel uploads into a header row plus string rows

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::{Map, Value};
use std::io::Cursor;
use uuid::Uuid;

use super::validate::FileKind;
use crate::error::UploadError;
use crate::models::Entity;

/// First sheet (or the CSV) as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// One usable row: the entity name plus every column of the source row
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRow {
    pub name: String,
    pub row_number: i32,
    pub original_data: Value,
}

pub fn parse_table(kind: FileKind, content: &[u8]) -> Result<ParsedTable, UploadError> {
    match kind {
        FileKind::Csv => parse_csv(content),
        FileKind::Xlsx | FileKind::Xls => parse_workbook(content),
    }
}

/// UTF-8 (with or without BOM), falling back to Latin-1
fn decode_text(content: &[u8]) -> String {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => content.iter().map(|&b| b as char).collect(),
    }
}

fn parse_csv(content: &[u8]) -> Result<ParsedTable, UploadError> {
    let text = decode_text(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| UploadError::Parse(e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| UploadError::Parse(e.to_string()))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(ParsedTable { headers, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn parse_workbook(content: &[u8]) -> Result<ParsedTable, UploadError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| UploadError::Parse(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| UploadError::Parse("workbook has no sheets".into()))?
        .map_err(|e| UploadError::Parse(e.to_string()))?;

    let mut rows = range.rows().map(|r| r.iter().map(cell_text).collect::<Vec<_>>());
    let headers = rows.next().unwrap_or_default();
    Ok(ParsedTable {
        headers,
        rows: rows.collect(),
    })
}

impl ParsedTable {
    /// Index of `column`, exact match first, then ignoring case and padding
    pub fn column_index(&self, column: &str) -> Result<usize, UploadError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .or_else(|| {
                self.headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(column.trim()))
            })
            .ok_or_else(|| UploadError::MissingColumn {
                column: column.to_string(),
                available: self.headers.clone(),
            })
    }

    /// Rows with a usable name in `name_column`.
    ///
    /// Blank names and the literal "nan" are skipped; row numbers stay
    /// aligned with the source (first data row is 1).
    pub fn entity_rows(&self, name_column: &str) -> Result<Vec<UploadRow>, UploadError> {
        let idx = self.column_index(name_column)?;

        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let name = row.get(idx).map(|s| s.trim()).unwrap_or_default();
                if name.is_empty() || name.eq_ignore_ascii_case("nan") {
                    return None;
                }

                let original_data: Map<String, Value> = self
                    .headers
                    .iter()
                    .enumerate()
                    .map(|(c, header)| {
                        let value = match row.get(c).map(|s| s.as_str()) {
                            Some("") | None => Value::Null,
                            Some(v) => Value::String(v.to_string()),
                        };
                        (header.clone(), value)
                    })
                    .collect();

                Some(UploadRow {
                    name: name.to_string(),
                    row_number: i as i32 + 1,
                    original_data: Value::Object(original_data),
                })
            })
            .collect())
    }
}

/// Pending entities for a new batch
pub fn build_entities(batch_id: Uuid, rows: Vec<UploadRow>) -> Vec<Entity> {
    rows.into_iter()
        .map(|row| {
            Entity::new_pending(
                batch_id,
                row.name,
                Some(row.original_data),
                Some(row.row_number),
            )
        })
        .collect()
}
