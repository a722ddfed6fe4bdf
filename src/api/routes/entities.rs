//! Entity listing, manual edits, resolution review and ownership trees

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{CurrentUser, RequestMeta};
use crate::api::state::AppState;
use crate::database::{page_window, EntityFilter, EntityStats, Page};
use crate::models::{
    AuditAction, Entity, EntityResolution, EntityType, NewAuditLog, ResolutionStatus,
};
use crate::ownership::{Direction, OwnershipTree, DEFAULT_MAX_DEPTH};
use crate::resolution::batch::MAX_OWNERSHIP_DEPTH;

const MAX_ENTITY_PAGE_SIZE: i64 = 200;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListEntitiesQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub status_filter: Option<ResolutionStatus>,
    pub search: Option<String>,
}

/// Fields a user may correct by hand
#[derive(Debug, Default, Deserialize)]
pub struct UpdateEntityRequest {
    pub resolved_name: Option<String>,
    pub charity_number: Option<String>,
    pub company_number: Option<String>,
    pub entity_type: Option<EntityType>,
    pub resolution_status: Option<ResolutionStatus>,
}

impl UpdateEntityRequest {
    fn apply(self, entity: &mut Entity) {
        if let Some(name) = self.resolved_name {
            entity.resolved_name = Some(name);
        }
        if let Some(number) = self.charity_number {
            entity.charity_number = Some(number);
        }
        if let Some(number) = self.company_number {
            entity.company_number = Some(number);
        }
        if let Some(kind) = self.entity_type {
            entity.entity_type = kind;
        }
        if let Some(status) = self.resolution_status {
            entity.resolution_status = status;
            if status.is_resolved() && entity.resolved_at.is_none() {
                entity.resolved_at = Some(Utc::now());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub resolution_id: Option<Uuid>,
    pub charity_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub max_depth: Option<u32>,
    pub direction: Option<Direction>,
}

impl TreeQuery {
    fn depth(&self) -> ApiResult<u32> {
        match self.max_depth {
            None => Ok(DEFAULT_MAX_DEPTH),
            Some(d) if (1..=MAX_OWNERSHIP_DEPTH).contains(&d) => Ok(d),
            Some(_) => Err(ApiError::bad_request(format!(
                "max_depth must be between 1 and {}",
                MAX_OWNERSHIP_DEPTH
            ))),
        }
    }
}

async fn owned_entity(state: &AppState, entity_id: Uuid, user_id: Uuid) -> ApiResult<Entity> {
    state
        .entities()
        .get_for_user(entity_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Entity not found"))
}

async fn ensure_batch_owner(state: &AppState, batch_id: Uuid, user_id: Uuid) -> ApiResult<()> {
    state
        .batches()
        .get_for_user(batch_id, user_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("Batch not found"))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /entities/batch/{batch_id}
pub async fn list_for_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(batch_id): Path<Uuid>,
    Query(query): Query<ListEntitiesQuery>,
) -> ApiResult<Json<Page<Entity>>> {
    ensure_batch_owner(&state, batch_id, user.id).await?;

    let (page, page_size, _) = page_window(query.page, query.page_size, MAX_ENTITY_PAGE_SIZE);
    let filter = EntityFilter {
        status: query.status_filter,
        search: query.search,
    };
    let entities = state
        .entities()
        .list(batch_id, &filter, page, page_size)
        .await?;
    Ok(Json(entities))
}

/// GET /entities/batch/{batch_id}/stats
pub async fn batch_stats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> ApiResult<Json<EntityStats>> {
    ensure_batch_owner(&state, batch_id, user.id).await?;
    Ok(Json(state.entities().stats(batch_id).await?))
}

/// GET /entities/{id}
pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(entity_id): Path<Uuid>,
) -> ApiResult<Json<Entity>> {
    Ok(Json(owned_entity(&state, entity_id, user.id).await?))
}

/// PATCH /entities/{id}
pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(entity_id): Path<Uuid>,
    Json(req): Json<UpdateEntityRequest>,
) -> ApiResult<Json<Entity>> {
    let mut entity = owned_entity(&state, entity_id, user.id).await?;
    req.apply(&mut entity);
    state.entities().save(&entity).await?;
    info!(entity_id = %entity_id, user_id = %user.id, "Entity updated manually");
    Ok(Json(entity))
}

/// GET /entities/{id}/resolutions
pub async fn resolutions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(entity_id): Path<Uuid>,
) -> ApiResult<Json<Vec<EntityResolution>>> {
    owned_entity(&state, entity_id, user.id).await?;
    Ok(Json(state.entities().resolutions_for_entity(entity_id).await?))
}

/// POST /entities/{id}/confirm
///
/// A candidate id or a charity number confirms; neither rejects the entity.
pub async fn confirm(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(entity_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<Entity>> {
    owned_entity(&state, entity_id, user.id).await?;

    let entity = state
        .resolver()
        .confirm_resolution(entity_id, req.resolution_id, req.charity_number)
        .await?;

    let action = if entity.resolution_status == ResolutionStatus::Rejected {
        AuditAction::EntityReject
    } else {
        AuditAction::EntityConfirm
    };
    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(action)
                .user(user.id)
                .resource("entity", entity_id)
                .details(json!({
                    "resolution_id": req.resolution_id,
                    "charity_number": entity.charity_number,
                })),
        ))
        .await;

    Ok(Json(entity))
}

/// POST /entities/{id}/re-resolve
pub async fn re_resolve(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(entity_id): Path<Uuid>,
) -> ApiResult<Json<Entity>> {
    owned_entity(&state, entity_id, user.id).await?;
    let entity = state.resolver().re_resolve(entity_id).await?;

    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::EntityResolve)
                .user(user.id)
                .resource("entity", entity_id)
                .description(format!("Re-resolved as {}", entity.resolution_status)),
        ))
        .await;

    Ok(Json(entity))
}

/// GET /entities/{id}/ownership-tree
pub async fn ownership_tree(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(entity_id): Path<Uuid>,
    Query(query): Query<TreeQuery>,
) -> ApiResult<Json<OwnershipTree>> {
    owned_entity(&state, entity_id, user.id).await?;
    let depth = query.depth()?;
    let direction = query.direction.unwrap_or(Direction::Both);

    let tree = state
        .ownership()
        .build_tree_for_entity(entity_id, depth, direction)
        .await?;
    Ok(Json(tree))
}

/// POST /entities/{id}/build-ownership-tree
pub async fn build_ownership_tree(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Path(entity_id): Path<Uuid>,
    Query(query): Query<TreeQuery>,
) -> ApiResult<Json<Value>> {
    let entity = owned_entity(&state, entity_id, user.id).await?;
    if !entity.resolution_status.is_resolved() {
        return Err(ApiError::bad_request(
            "Entity must be matched or confirmed before building an ownership tree",
        ));
    }
    let depth = query.depth()?;

    let tree = state
        .ownership()
        .build_tree_for_entity(entity_id, depth, Direction::Down)
        .await?;

    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::OwnershipBuild)
                .user(user.id)
                .resource("entity", entity_id)
                .details(json!({
                    "max_depth": depth,
                    "total_entities": tree.total_entities,
                })),
        ))
        .await;

    Ok(Json(json!({
        "message": "Ownership tree built",
        "entity_id": entity_id,
        "total_entities": tree.total_entities,
        "max_depth_reached": tree.max_depth_reached,
        "tree": tree,
    })))
}
