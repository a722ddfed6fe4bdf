//! Batch downloads as xlsx or CSV attachments

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{CurrentUser, RequestMeta};
use crate::api::state::AppState;
use crate::export::{ExportFile, ExportOptions};
use crate::models::{AuditAction, NewAuditLog};

#[derive(Debug, Deserialize)]
pub struct ExcelExportRequest {
    pub batch_id: Uuid,
    #[serde(flatten)]
    pub options: ExportOptions,
}

#[derive(Debug, Deserialize)]
pub struct CsvExportRequest {
    pub batch_id: Uuid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Xlsx,
    Csv,
}

#[derive(Debug, Deserialize)]
pub struct QuickExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

fn content_disposition(filename: &str) -> String {
    format!("attachment; filename=\"{}\"", filename)
}

impl IntoResponse for ExportFile {
    fn into_response(self) -> Response {
        let mut response = self.bytes.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        if let Ok(v) = HeaderValue::from_str(&content_disposition(&self.filename)) {
            headers.insert(header::CONTENT_DISPOSITION, v);
        }
        response
    }
}

async fn export(
    state: &AppState,
    user_id: Uuid,
    meta: &RequestMeta,
    batch_id: Uuid,
    format: ExportFormat,
    options: ExportOptions,
) -> ApiResult<ExportFile> {
    state
        .batches()
        .get_for_user(batch_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Batch not found"))?;

    let exports = state.exports();
    let file = match format {
        ExportFormat::Xlsx => exports.export_batch_to_excel(batch_id, options).await?,
        ExportFormat::Csv => exports.export_batch_to_csv(batch_id).await?,
    }
    .ok_or_else(|| ApiError::not_found("Batch not found"))?;

    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::Export)
                .user(user_id)
                .resource("batch", batch_id)
                .details(json!({
                    "format": match format {
                        ExportFormat::Xlsx => "xlsx",
                        ExportFormat::Csv => "csv",
                    },
                    "filename": file.filename,
                    "size": file.bytes.len(),
                })),
        ))
        .await;

    Ok(file)
}

/// POST /exports/excel
pub async fn excel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Json(req): Json<ExcelExportRequest>,
) -> ApiResult<ExportFile> {
    export(&state, user.id, &meta, req.batch_id, ExportFormat::Xlsx, req.options).await
}

/// POST /exports/csv
pub async fn csv(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Json(req): Json<CsvExportRequest>,
) -> ApiResult<ExportFile> {
    export(
        &state,
        user.id,
        &meta,
        req.batch_id,
        ExportFormat::Csv,
        ExportOptions::default(),
    )
    .await
}

/// GET /exports/batch/{id}/quick-export?format=xlsx|csv
pub async fn quick_export(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(batch_id): Path<Uuid>,
    Query(query): Query<QuickExportQuery>,
) -> ApiResult<ExportFile> {
    export(
        &state,
        user.id,
        &meta,
        batch_id,
        query.format,
        ExportOptions::default(),
    )
    .await
}
