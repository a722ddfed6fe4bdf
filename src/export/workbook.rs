//! Multi-sheet xlsx report for one batch

use anyhow::{Context, Result};
use chrono::Utc;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet};
use std::collections::HashMap;
use uuid::Uuid;

use super::{ExportData, ExportOptions};
use crate::models::Entity;

const HEADER_FILL: u32 = 0x1F4E79;
const SECTION_FILL: u32 = 0x4472C4;
const ALT_ROW_FILL: u32 = 0xD9E2F3;
const MAX_COLUMN_WIDTH: usize = 50;
const MONEY_FORMAT: &str = "£#,##0.00";

pub const ENTITY_COLUMNS: [&str; 14] = [
    "Row #",
    "Original Name",
    "Resolved Name",
    "Charity Number",
    "Company Number",
    "Entity Type",
    "Resolution Status",
    "Confidence (%)",
    "Charity Status",
    "Address",
    "Website",
    "Latest Income",
    "Latest Expenditure",
    "Ownership Level",
];

const RESOLUTION_COLUMNS: [&str; 6] = [
    "Entity Name",
    "Candidate Name",
    "Charity Number",
    "Confidence",
    "Match Method",
    "Selected",
];

const OWNERSHIP_COLUMNS: [&str; 7] = [
    "Level",
    "Entity Name",
    "Charity Number",
    "Company Number",
    "Entity Type",
    "Relationship",
    "Parent Entity",
];

const FINANCIAL_COLUMNS: [&str; 6] = [
    "Entity Name",
    "Charity Number",
    "Income",
    "Expenditure",
    "Financial Year End",
    "Surplus/Deficit",
];

struct Styles {
    title: Format,
    bold: Format,
    header: Format,
    section: Format,
    body: Format,
    body_alt: Format,
    money: Format,
    money_alt: Format,
    money_total: Format,
}

impl Styles {
    fn new() -> Self {
        let body = Format::new().set_border(FormatBorder::Thin);
        let header = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(HEADER_FILL))
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::Center);
        Self {
            title: Format::new()
                .set_bold()
                .set_font_size(16)
                .set_align(FormatAlign::Center),
            bold: Format::new().set_bold(),
            section: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(SECTION_FILL)),
            body_alt: body.clone().set_background_color(Color::RGB(ALT_ROW_FILL)),
            money: body.clone().set_num_format(MONEY_FORMAT),
            money_alt: body
                .clone()
                .set_num_format(MONEY_FORMAT)
                .set_background_color(Color::RGB(ALT_ROW_FILL)),
            money_total: Format::new()
                .set_bold()
                .set_num_format(MONEY_FORMAT)
                .set_border(FormatBorder::Thin),
            header,
            body,
        }
    }
}

/// Value of one data cell
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(f64),
    Money(f64),
    Empty,
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn opt_text(value: Option<&str>) -> Self {
        value.map(Cell::text).unwrap_or(Cell::Empty)
    }

    fn opt_money(value: Option<f64>) -> Self {
        value.map(Cell::Money).unwrap_or(Cell::Empty)
    }

    fn display_len(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => n.to_string().len(),
            Cell::Money(n) => format!("£{:.2}", n).len() + 2,
            Cell::Empty => 0,
        }
    }
}

/// Worksheet wrapper that tracks column widths as cells are written
struct Sheet<'a> {
    ws: &'a mut Worksheet,
    styles: &'a Styles,
    widths: Vec<usize>,
}

impl<'a> Sheet<'a> {
    fn new(workbook: &'a mut Workbook, name: &str, styles: &'a Styles) -> Result<Self> {
        let ws = workbook.add_worksheet();
        ws.set_name(name)
            .with_context(|| format!("Invalid sheet name {}", name))?;
        Ok(Self {
            ws,
            styles,
            widths: Vec::new(),
        })
    }

    fn track(&mut self, col: u16, len: usize) {
        let col = col as usize;
        if self.widths.len() <= col {
            self.widths.resize(col + 1, 0);
        }
        self.widths[col] = self.widths[col].max(len);
    }

    fn label(&mut self, row: u32, col: u16, value: &str, format: &Format) -> Result<()> {
        self.ws.write_string_with_format(row, col, value, format)?;
        self.track(col, value.chars().count());
        Ok(())
    }

    fn header(&mut self, row: u32, headers: &[&str]) -> Result<()> {
        let format = &self.styles.header;
        for (col, title) in headers.iter().enumerate() {
            self.ws
                .write_string_with_format(row, col as u16, *title, format)?;
        }
        for (col, title) in headers.iter().enumerate() {
            self.track(col as u16, title.chars().count());
        }
        Ok(())
    }

    /// Bordered data row, shaded on even rows
    fn data_row(&mut self, row: u32, cells: &[Cell]) -> Result<()> {
        let alt = row % 2 == 0;
        let styles = self.styles;
        let (body, money) = if alt {
            (&styles.body_alt, &styles.money_alt)
        } else {
            (&styles.body, &styles.money)
        };

        for (col, cell) in cells.iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Text(s) => {
                    self.ws.write_string_with_format(row, col, s, body)?;
                }
                Cell::Number(n) => {
                    self.ws.write_number_with_format(row, col, *n, body)?;
                }
                Cell::Money(n) => {
                    self.ws.write_number_with_format(row, col, *n, money)?;
                }
                Cell::Empty => {
                    self.ws.write_blank(row, col, body)?;
                }
            }
            self.track(col, cell.display_len());
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        for (col, len) in self.widths.iter().enumerate() {
            let width = (len + 2).min(MAX_COLUMN_WIDTH);
            self.ws.set_column_width(col as u16, width as f64)?;
        }
        Ok(())
    }
}

/// Render the batch report to xlsx bytes
pub fn build_workbook(data: &ExportData, options: &ExportOptions) -> Result<Vec<u8>> {
    let styles = Styles::new();
    let mut workbook = Workbook::new();

    summary_sheet(&mut workbook, &styles, data)?;
    entities_sheet(&mut workbook, &styles, &data.entities)?;
    if options.include_resolutions {
        resolutions_sheet(&mut workbook, &styles, data)?;
    }
    if options.include_ownership {
        ownership_sheet(&mut workbook, &styles, &data.entities)?;
    }
    if options.include_financial {
        financial_sheet(&mut workbook, &styles, &data.entities)?;
    }
    if options.include_trustees {
        enriched_sheet(&mut workbook, &styles, &data.entities)?;
    }

    workbook
        .save_to_buffer()
        .context("Failed to render workbook")
}

fn summary_sheet(workbook: &mut Workbook, styles: &Styles, data: &ExportData) -> Result<()> {
    let batch = &data.batch;
    let mut sheet = Sheet::new(workbook, "Summary", styles)?;

    let title = format!("Charity Data Enrichment Report: {}", batch.name);
    sheet.ws.merge_range(0, 0, 0, 3, &title, &styles.title)?;
    sheet.label(
        1,
        0,
        &format!("Exported: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC")),
        &Format::new(),
    )?;

    sheet.label(3, 0, "Batch Information", &styles.section)?;
    let timestamp = |t: Option<chrono::DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    };
    let info = [
        ("Batch ID:", batch.id.to_string()),
        ("Batch Name:", batch.name.clone()),
        ("Description:", batch.description.clone().unwrap_or_default()),
        ("Original File:", batch.original_filename.clone().unwrap_or_default()),
        ("Status:", batch.status.to_string()),
        ("Created:", timestamp(Some(batch.created_at))),
        ("Processed:", timestamp(batch.processing_completed_at)),
    ];
    let mut row = 4;
    for (label, value) in info {
        sheet.label(row, 0, label, &styles.bold)?;
        sheet.label(row, 1, &value, &Format::new())?;
        row += 1;
    }

    row += 1;
    sheet.label(row, 0, "Statistics", &styles.section)?;
    row += 1;
    let stats = [
        ("Total Records:", batch.total_records.to_string()),
        ("Processed:", batch.processed_records.to_string()),
        ("Matched:", batch.matched_records.to_string()),
        ("Failed:", batch.failed_records.to_string()),
        ("Match Rate:", format!("{:.1}%", batch.match_rate())),
    ];
    for (label, value) in stats {
        sheet.label(row, 0, label, &styles.bold)?;
        sheet.label(row, 1, &value, &Format::new())?;
        row += 1;
    }

    sheet.finish()
}

fn entity_cells(entity: &Entity) -> Vec<Cell> {
    vec![
        entity
            .row_number
            .map(|n| Cell::Number(n as f64))
            .unwrap_or(Cell::Empty),
        Cell::text(&entity.original_name),
        Cell::opt_text(entity.resolved_name.as_deref()),
        Cell::opt_text(entity.charity_number.as_deref()),
        Cell::opt_text(entity.company_number.as_deref()),
        Cell::text(entity.entity_type.as_str()),
        Cell::text(entity.resolution_status.as_str()),
        entity
            .resolution_confidence
            .map(|c| Cell::Number((c * 1000.0).round() / 10.0))
            .unwrap_or(Cell::Empty),
        Cell::opt_text(entity.charity_status.as_deref()),
        Cell::opt_text(entity.address.as_deref()),
        Cell::opt_text(entity.website.as_deref()),
        Cell::opt_money(entity.latest_income),
        Cell::opt_money(entity.latest_expenditure),
        Cell::Number(entity.ownership_level as f64),
    ]
}

fn entities_sheet(workbook: &mut Workbook, styles: &Styles, entities: &[Entity]) -> Result<()> {
    let mut sheet = Sheet::new(workbook, "Entities", styles)?;
    sheet.header(0, &ENTITY_COLUMNS)?;
    for (i, entity) in entities.iter().enumerate() {
        sheet.data_row(i as u32 + 1, &entity_cells(entity))?;
    }
    sheet.finish()
}

fn resolutions_sheet(workbook: &mut Workbook, styles: &Styles, data: &ExportData) -> Result<()> {
    let mut sheet = Sheet::new(workbook, "Resolution Candidates", styles)?;
    if data.resolutions.is_empty() {
        sheet.label(0, 0, "No resolution candidates found", &Format::new())?;
        return sheet.finish();
    }

    sheet.header(0, &RESOLUTION_COLUMNS)?;
    for (i, row) in data.resolutions.iter().enumerate() {
        let r = &row.resolution;
        sheet.data_row(
            i as u32 + 1,
            &[
                Cell::text(&row.entity_name),
                Cell::text(&r.candidate_name),
                Cell::opt_text(r.charity_number.as_deref()),
                Cell::text(format!("{:.1}%", r.confidence_score * 100.0)),
                Cell::text(&r.match_method),
                Cell::text(if r.is_selected { "Yes" } else { "No" }),
            ],
        )?;
    }
    sheet.finish()
}

/// Roots that have discovered children, each followed by its descendants
/// depth-first, as (depth, entity, parent) rows.
fn ownership_rows(entities: &[Entity]) -> Vec<(usize, &Entity, Option<&Entity>)> {
    let by_id: HashMap<Uuid, &Entity> = entities.iter().map(|e| (e.id, e)).collect();
    let mut children: HashMap<Uuid, Vec<&Entity>> = HashMap::new();
    for entity in entities {
        if let Some(parent_id) = entity.parent_entity_id {
            if by_id.contains_key(&parent_id) {
                children.entry(parent_id).or_default().push(entity);
            }
        }
    }

    let mut rows = Vec::new();
    let roots = entities.iter().filter(|e| {
        e.parent_entity_id
            .map_or(true, |p| !by_id.contains_key(&p))
            && children.contains_key(&e.id)
    });

    for root in roots {
        let mut stack: Vec<(usize, &Entity, Option<&Entity>)> = vec![(0, root, None)];
        let mut seen = std::collections::HashSet::new();
        while let Some((depth, entity, parent)) = stack.pop() {
            if !seen.insert(entity.id) {
                continue;
            }
            rows.push((depth, entity, parent));
            if let Some(kids) = children.get(&entity.id) {
                for kid in kids.iter().rev() {
                    stack.push((depth + 1, *kid, Some(entity)));
                }
            }
        }
    }
    rows
}

fn relationship_label(entity: &Entity, depth: usize) -> &'static str {
    if depth == 0 {
        return "Root";
    }
    match entity.resolution_method.as_deref() {
        Some("subsidiary_discovery") => "Subsidiary",
        Some("related_discovery") => "Trustee charity",
        _ => "Related",
    }
}

fn ownership_sheet(workbook: &mut Workbook, styles: &Styles, entities: &[Entity]) -> Result<()> {
    let mut sheet = Sheet::new(workbook, "Ownership Tree", styles)?;
    let rows = ownership_rows(entities);
    if rows.is_empty() {
        sheet.label(0, 0, "No ownership relationships found", &Format::new())?;
        return sheet.finish();
    }

    sheet.header(0, &OWNERSHIP_COLUMNS)?;
    for (i, (depth, entity, parent)) in rows.into_iter().enumerate() {
        sheet.data_row(
            i as u32 + 1,
            &[
                Cell::text(format!("{}{}", "    ".repeat(depth), depth)),
                Cell::text(entity.display_name()),
                Cell::opt_text(entity.charity_number.as_deref()),
                Cell::opt_text(entity.company_number.as_deref()),
                Cell::text(entity.entity_type.as_str()),
                Cell::text(relationship_label(entity, depth)),
                Cell::opt_text(parent.map(|p| p.display_name())),
            ],
        )?;
    }
    sheet.finish()
}

fn financial_sheet(workbook: &mut Workbook, styles: &Styles, entities: &[Entity]) -> Result<()> {
    let mut sheet = Sheet::new(workbook, "Financial Data", styles)?;
    let with_figures: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.latest_income.is_some() || e.latest_expenditure.is_some())
        .collect();

    if with_figures.is_empty() {
        sheet.label(0, 0, "No financial data available", &Format::new())?;
        return sheet.finish();
    }

    sheet.header(0, &FINANCIAL_COLUMNS)?;
    let (mut total_income, mut total_expenditure) = (0.0, 0.0);
    for (i, entity) in with_figures.iter().enumerate() {
        let income = entity.latest_income.unwrap_or(0.0);
        let expenditure = entity.latest_expenditure.unwrap_or(0.0);
        total_income += income;
        total_expenditure += expenditure;

        sheet.data_row(
            i as u32 + 1,
            &[
                Cell::text(entity.display_name()),
                Cell::opt_text(entity.charity_number.as_deref()),
                Cell::opt_money(entity.latest_income),
                Cell::opt_money(entity.latest_expenditure),
                entity
                    .latest_financial_year_end
                    .map(|d| Cell::text(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Cell::Empty),
                Cell::Money(income - expenditure),
            ],
        )?;
    }

    let total_row = with_figures.len() as u32 + 2;
    sheet.label(total_row, 0, "TOTALS", &styles.bold)?;
    sheet
        .ws
        .write_number_with_format(total_row, 2, total_income, &styles.money_total)?;
    sheet
        .ws
        .write_number_with_format(total_row, 3, total_expenditure, &styles.money_total)?;
    sheet.ws.write_number_with_format(
        total_row,
        5,
        total_income - total_expenditure,
        &styles.money_total,
    )?;

    sheet.finish()
}

fn enriched_sheet(workbook: &mut Workbook, styles: &Styles, entities: &[Entity]) -> Result<()> {
    let mut sheet = Sheet::new(workbook, "Enriched Data", styles)?;
    let resolved: Vec<&Entity> = entities
        .iter()
        .filter(|e| e.resolution_status.is_resolved())
        .collect();

    let mut trustees = Vec::new();
    let mut subsidiaries = Vec::new();
    for entity in &resolved {
        let name = entity.display_name();
        let number = entity.charity_number.as_deref();
        for trustee in entity.enriched_list("trustees") {
            trustees.push([
                Cell::text(name),
                Cell::opt_text(number),
                Cell::opt_text(trustee.get("name").and_then(|v| v.as_str())),
                json_cell(trustee.get("id")),
            ]);
        }
        for sub in entity.enriched_list("subsidiaries") {
            subsidiaries.push([
                Cell::text(name),
                Cell::opt_text(number),
                Cell::opt_text(sub.get("name").and_then(|v| v.as_str())),
                json_cell(sub.get("company_number")),
            ]);
        }
    }

    let mut row = 0;
    sheet.label(row, 0, "TRUSTEES", &styles.section)?;
    row += 1;
    if trustees.is_empty() {
        sheet.label(row, 0, "No trustee data available", &Format::new())?;
        row += 1;
    } else {
        sheet.header(
            row,
            &["Charity Name", "Charity Number", "Trustee Name", "Trustee ID"],
        )?;
        row += 1;
        for cells in &trustees {
            sheet.data_row(row, cells)?;
            row += 1;
        }
    }

    row += 1;
    sheet.label(row, 0, "SUBSIDIARIES", &styles.section)?;
    row += 1;
    if subsidiaries.is_empty() {
        sheet.label(row, 0, "No subsidiary data available", &Format::new())?;
    } else {
        sheet.header(
            row,
            &["Charity Name", "Charity Number", "Subsidiary Name", "Company Number"],
        )?;
        row += 1;
        for cells in &subsidiaries {
            sheet.data_row(row, cells)?;
            row += 1;
        }
    }

    sheet.finish()
}

fn json_cell(value: Option<&serde_json::Value>) -> Cell {
    match value {
        Some(serde_json::Value::String(s)) => Cell::text(s.as_str()),
        Some(serde_json::Value::Number(n)) => Cell::text(n.to_string()),
        _ => Cell::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(batch: Uuid, name: &str) -> Entity {
        Entity::new_pending(batch, name, None, None)
    }

    #[test]
    fn test_ownership_rows_depth_first() {
        let batch = Uuid::new_v4();
        let root = entity(batch, "Root");
        let mut child = entity(batch, "Child");
        child.parent_entity_id = Some(root.id);
        child.ownership_level = 1;
        let mut grandchild = entity(batch, "Grandchild");
        grandchild.parent_entity_id = Some(child.id);
        grandchild.ownership_level = 2;
        let mut sibling = entity(batch, "Sibling");
        sibling.parent_entity_id = Some(root.id);
        let lonely = entity(batch, "Lonely");

        let all = vec![root, child, grandchild, sibling, lonely];
        let rows = ownership_rows(&all);
        let names: Vec<(usize, &str)> = rows
            .iter()
            .map(|(d, e, _)| (*d, e.original_name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![(0, "Root"), (1, "Child"), (2, "Grandchild"), (1, "Sibling")]
        );
        assert_eq!(rows[2].2.map(|p| p.original_name.as_str()), Some("Child"));
    }

    #[test]
    fn test_entity_cells_match_headers() {
        let mut e = entity(Uuid::new_v4(), "Oxfam");
        e.resolution_confidence = Some(0.9567);
        let cells = entity_cells(&e);
        assert_eq!(cells.len(), ENTITY_COLUMNS.len());
        assert_eq!(cells[7], Cell::Number(95.7));
        assert_eq!(cells[0], Cell::Empty);
    }

    #[test]
    fn test_json_cell_renders_numbers() {
        assert_eq!(json_cell(Some(&serde_json::json!(42))), Cell::text("42"));
        assert_eq!(json_cell(None), Cell::Empty);
    }
}
