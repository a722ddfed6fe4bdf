//! User administration for superusers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{RequestMeta, SuperUser};
use crate::api::state::AppState;
use crate::models::{AuditAction, NewAuditLog, UserProfile};

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<AppState>,
    SuperUser(_admin): SuperUser,
) -> ApiResult<Json<Vec<UserProfile>>> {
    let users = state.users().list().await?;
    Ok(Json(users.iter().map(UserProfile::from).collect()))
}

/// PATCH /admin/users/:id - activate, deactivate, promote or demote
pub async fn update_user(
    State(state): State<AppState>,
    SuperUser(admin): SuperUser,
    meta: RequestMeta,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    if user_id == admin.id {
        return Err(ApiError::bad_request("Cannot change your own account flags"));
    }
    let users = state.users();
    let target = users
        .get(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if let Some(is_active) = req.is_active {
        users.set_active(&target.email, is_active).await?;
        if !is_active {
            users.invalidate_tokens(target.id).await?;
        }
    }
    if let Some(is_superuser) = req.is_superuser {
        users.set_superuser(&target.email, is_superuser).await?;
    }

    let updated = users
        .get(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!(
        admin_id = %admin.id,
        user_id = %updated.id,
        is_active = updated.is_active,
        is_superuser = updated.is_superuser,
        "User flags updated"
    );
    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::ApiCall)
                .user(admin.id)
                .resource("user", updated.id)
                .description(format!(
                    "Set {} active={} superuser={}",
                    updated.email, updated.is_active, updated.is_superuser
                )),
        ))
        .await;

    Ok(Json(UserProfile::from(&updated)))
}
