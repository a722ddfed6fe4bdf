//! Two-factor enrolment

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{CurrentUser, RequestMeta};
use crate::api::state::AppState;
use crate::auth::{two_factor, verify_password_async};
use crate::models::{AuditAction, NewAuditLog};

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct DisableRequest {
    pub password: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub backup_codes_remaining: usize,
}

/// POST /2fa/setup
///
/// Stores a fresh secret and backup codes but leaves 2FA disabled until the
/// first code is verified.
pub async fn setup(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<two_factor::TwoFactorSetup>> {
    if user.two_factor_enabled {
        return Err(ApiError::bad_request("Two-factor authentication is already enabled"));
    }

    let setup = two_factor::setup(&user.email)?;
    state
        .users()
        .store_two_factor_setup(user.id, &setup.secret, &setup.backup_codes)
        .await?;

    Ok(Json(setup))
}

/// POST /2fa/verify - enable after a valid TOTP code
pub async fn verify(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Json(req): Json<VerifyCodeRequest>,
) -> ApiResult<Json<Value>> {
    if user.two_factor_enabled {
        return Err(ApiError::bad_request("Two-factor authentication is already enabled"));
    }
    let Some(secret) = user.two_factor_secret.as_deref() else {
        return Err(ApiError::bad_request("Two-factor setup has not been started"));
    };
    if !two_factor::verify_totp(secret, req.code.trim()) {
        return Err(ApiError::bad_request("Invalid verification code"));
    }

    state.users().enable_two_factor(user.id).await?;
    state
        .audit()
        .log(meta.audit(NewAuditLog::new(AuditAction::TwoFactorEnable).user(user.id)))
        .await;

    info!(user_id = %user.id, "Two-factor enabled");
    Ok(Json(json!({ "message": "Two-factor authentication enabled" })))
}

/// POST /2fa/disable - needs both the password and a current code
pub async fn disable(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Json(req): Json<DisableRequest>,
) -> ApiResult<Json<Value>> {
    if !user.two_factor_enabled {
        return Err(ApiError::bad_request("Two-factor authentication is not enabled"));
    }
    if !verify_password_async(req.password, user.hashed_password.clone()).await {
        return Err(ApiError::bad_request("Password is incorrect"));
    }
    if !state.auth.verify_second_factor(&user, req.code.trim()).await? {
        return Err(ApiError::bad_request("Invalid verification code"));
    }

    state.users().disable_two_factor(user.id).await?;
    state
        .audit()
        .log(meta.audit(NewAuditLog::new(AuditAction::TwoFactorDisable).user(user.id)))
        .await;

    Ok(Json(json!({ "message": "Two-factor authentication disabled" })))
}

/// GET /2fa/status
pub async fn status(CurrentUser(user): CurrentUser) -> Json<TwoFactorStatus> {
    Json(TwoFactorStatus {
        enabled: user.two_factor_enabled,
        backup_codes_remaining: user.backup_code_list().len(),
    })
}
