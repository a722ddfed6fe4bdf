//! Upload, listing and processing of entity batches

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{CurrentUser, RequestMeta};
use crate::api::state::AppState;
use crate::database::{page_window, Page};
use crate::models::{AuditAction, BatchStatus, EntityBatch, NewAuditLog};
use crate::resolution::{batch::DEFAULT_OWNERSHIP_DEPTH, ProcessOptions};
use crate::upload::{build_entities, read_upload, DEFAULT_NAME_COLUMN};

const MAX_BATCH_PAGE_SIZE: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListBatchesQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status_filter: Option<BatchStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    /// Accepted for compatibility; matching is always fuzzy
    #[serde(default)]
    pub use_ai_matching: Option<bool>,
    #[serde(default = "default_true")]
    pub build_ownership_tree: bool,
    #[serde(default = "default_depth")]
    pub max_ownership_depth: i64,
}

impl Default for ProcessRequest {
    fn default() -> Self {
        Self {
            use_ai_matching: None,
            build_ownership_tree: true,
            max_ownership_depth: DEFAULT_OWNERSHIP_DEPTH as i64,
        }
    }
}

impl ProcessRequest {
    fn options(&self) -> ProcessOptions {
        ProcessOptions {
            build_ownership_tree: self.build_ownership_tree,
            max_ownership_depth: ProcessOptions::clamp_depth(self.max_ownership_depth),
            ..ProcessOptions::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_depth() -> i64 {
    DEFAULT_OWNERSHIP_DEPTH as i64
}

/// Multipart fields of an upload
#[derive(Debug, Default)]
struct UploadForm {
    filename: Option<String>,
    content: Option<Vec<u8>>,
    name: Option<String>,
    description: Option<String>,
    name_column: Option<String>,
    auto_process: Option<bool>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
        {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "file" => {
                    form.filename = field.file_name().map(str::to_string);
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;
                    form.content = Some(bytes.to_vec());
                }
                other => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid field {}: {}", other, e)))?;
                    let text = Some(text.trim().to_string()).filter(|t| !t.is_empty());
                    match other {
                        "name" => form.name = text,
                        "description" => form.description = text,
                        "name_column" => form.name_column = text,
                        "auto_process" => {
                            form.auto_process = text.map(|t| parse_bool(&t)).transpose()?
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(form)
    }
}

fn parse_bool(value: &str) -> ApiResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ApiError::bad_request(format!("Invalid boolean: {}", value))),
    }
}

/// Run a batch in the background; the task logs its own failure
fn spawn_processing(state: &AppState, batch_id: Uuid, options: ProcessOptions) {
    let processor = state.processor();
    tokio::spawn(async move {
        if let Err(e) = processor.process_batch(batch_id, options).await {
            error!(batch_id = %batch_id, error = %e, "Background batch processing failed");
        }
    });
}

async fn owned_batch(state: &AppState, batch_id: Uuid, user_id: Uuid) -> ApiResult<EntityBatch> {
    state
        .batches()
        .get_for_user(batch_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Batch not found"))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /batches/upload
pub async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<EntityBatch>)> {
    let form = UploadForm::read(multipart).await?;
    let (Some(filename), Some(content)) = (form.filename, form.content) else {
        return Err(ApiError::bad_request("No file provided"));
    };
    let name_column = form.name_column.as_deref().unwrap_or(DEFAULT_NAME_COLUMN);

    let rows = read_upload(
        &filename,
        &content,
        name_column,
        &state.settings.allowed_extensions,
        state.settings.max_upload_bytes(),
    )?;

    let batch_id = Uuid::new_v4();
    let entities = build_entities(batch_id, rows);
    let batch_name = form.name.unwrap_or_else(|| filename.clone());

    let batch = state
        .batches()
        .create_with_entities(
            batch_id,
            user.id,
            &batch_name,
            form.description.as_deref(),
            Some(&filename),
            &entities,
        )
        .await?;

    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::BatchUpload)
                .user(user.id)
                .resource("batch", batch.id)
                .description(format!("Uploaded {} with {} entities", filename, entities.len()))
                .details(json!({ "filename": filename, "total_records": entities.len() })),
        ))
        .await;

    info!(batch_id = %batch.id, user_id = %user.id, records = entities.len(), "Batch uploaded");

    if form.auto_process.unwrap_or(true) && !entities.is_empty() {
        spawn_processing(&state, batch.id, ProcessOptions::default());
    }

    Ok((StatusCode::CREATED, Json(batch)))
}

/// GET /batches
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListBatchesQuery>,
) -> ApiResult<Json<Page<EntityBatch>>> {
    let (page, page_size, _) = page_window(query.page, query.page_size, MAX_BATCH_PAGE_SIZE);
    let batches = state
        .batches()
        .list_for_user(user.id, query.status_filter, page, page_size)
        .await?;
    Ok(Json(batches))
}

/// GET /batches/{id}
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<EntityBatch>> {
    Ok(Json(owned_batch(&state, batch_id, user.id).await?))
}

/// DELETE /batches/{id}
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let batch = owned_batch(&state, batch_id, user.id).await?;
    state.batches().delete(batch.id).await?;

    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::BatchDelete)
                .user(user.id)
                .resource("batch", batch.id)
                .description(format!("Deleted batch {}", batch.name)),
        ))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /batches/{id}/process
pub async fn process(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(batch_id): Path<Uuid>,
    body: Option<Json<ProcessRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    start_processing(&state, &user.id, &meta, batch_id, &req, false).await
}

/// POST /batches/{id}/reprocess - unresolved entities go back to pending first
pub async fn reprocess(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(batch_id): Path<Uuid>,
    body: Option<Json<ProcessRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    start_processing(&state, &user.id, &meta, batch_id, &req, true).await
}

async fn start_processing(
    state: &AppState,
    user_id: &Uuid,
    meta: &RequestMeta,
    batch_id: Uuid,
    req: &ProcessRequest,
    reset_unresolved: bool,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let batch = owned_batch(state, batch_id, *user_id).await?;
    if batch.status == BatchStatus::Processing {
        return Err(ApiError::bad_request("Batch is already being processed"));
    }

    let reset = if reset_unresolved {
        state.entities().reset_unresolved(batch_id).await?
    } else {
        0
    };

    let options = req.options();
    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::BatchProcess)
                .user(*user_id)
                .resource("batch", batch_id)
                .details(json!({
                    "build_ownership_tree": options.build_ownership_tree,
                    "max_ownership_depth": options.max_ownership_depth,
                    "reset_entities": reset,
                })),
        ))
        .await;

    spawn_processing(state, batch_id, options);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Batch processing started",
            "batch_id": batch_id,
            "status": BatchStatus::Processing,
            "reset_entities": reset,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::batch::MAX_OWNERSHIP_DEPTH;

    #[test]
    fn test_process_request_defaults() {
        let req: ProcessRequest = serde_json::from_str("{}").unwrap();
        assert!(req.build_ownership_tree);
        assert_eq!(req.options().max_ownership_depth, DEFAULT_OWNERSHIP_DEPTH);
    }

    #[test]
    fn test_process_request_clamps_depth() {
        let req: ProcessRequest =
            serde_json::from_str(r#"{"max_ownership_depth": 50, "use_ai_matching": true}"#).unwrap();
        assert_eq!(req.options().max_ownership_depth, MAX_OWNERSHIP_DEPTH);

        let req: ProcessRequest = serde_json::from_str(r#"{"max_ownership_depth": 0}"#).unwrap();
        assert_eq!(req.options().max_ownership_depth, DEFAULT_OWNERSHIP_DEPTH);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("True").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }
}
