//! Registration, login, token refresh, profile and API key endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::{CurrentUser, RequestMeta};
use crate::api::state::AppState;
use crate::auth::{
    hash_password_async, validate_password_strength, verify_password_async, FailedAttempt,
    TokenPair,
};
use crate::database::NewUser;
use crate::error::AuthError;
use crate::models::{AuditAction, NewAuditLog, UserProfile};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub totp_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
    pub message: String,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !email.contains(' ')
        }
        None => false,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let email = req.email.trim().to_lowercase();
    if !looks_like_email(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    validate_password_strength(&req.password)?;

    let users = state.users();
    if users.find_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("Email already registered"));
    }

    let hashed_password = hash_password_async(req.password).await?;
    let user = users
        .create(NewUser {
            email,
            hashed_password,
            full_name: req.full_name,
            organization: req.organization,
            is_superuser: false,
        })
        .await?;

    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::Register)
                .user(user.id)
                .resource("user", user.id)
                .description("User registered"),
        ))
        .await;

    info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenPair>> {
    let email = req.email.trim().to_lowercase();
    let limiter = &state.limiter;
    let audit = state.audit();

    if let (true, remaining) = limiter.is_locked(&email).await {
        let retry_after = remaining.unwrap_or(limiter.lockout_seconds());
        return Err(ApiError::TooManyRequests {
            detail: format!(
                "Account temporarily locked due to too many failed attempts. Try again in {} minutes.",
                retry_after.div_ceil(60)
            ),
            retry_after,
        });
    }

    let user = state.auth.authenticate(&email, &req.password).await?;
    let Some(user) = user else {
        audit
            .log(meta.audit(
                NewAuditLog::new(AuditAction::Login)
                    .description(format!("Failed login for {}", email))
                    .failed("Invalid email or password"),
            ))
            .await;

        return match limiter.record_failed_attempt(&email, meta.ip.as_deref()).await {
            FailedAttempt::Locked => Err(ApiError::TooManyRequests {
                detail: "Too many failed attempts. Account temporarily locked.".into(),
                retry_after: limiter.lockout_seconds(),
            }),
            FailedAttempt::Remaining(_) => Err(AuthError::InvalidCredentials.into()),
        };
    };

    if !user.is_active {
        return Err(ApiError::forbidden("User account is inactive"));
    }

    if user.two_factor_enabled {
        let Some(code) = req.totp_code.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Err(ApiError::TwoFactorRequired);
        };
        if !state.auth.verify_second_factor(&user, code).await? {
            limiter.record_failed_attempt(&email, meta.ip.as_deref()).await;
            audit
                .log(meta.audit(
                    NewAuditLog::new(AuditAction::Login)
                        .user(user.id)
                        .failed("Invalid two-factor code"),
                ))
                .await;
            return Err(ApiError::unauthorized("Invalid two-factor code"));
        }
    }

    limiter.record_successful_login(&email).await;
    state.users().touch_last_login(user.id).await?;
    let tokens = state.auth.rotate_tokens(&user, None).await?;

    audit
        .log(meta.audit(
            NewAuditLog::new(AuditAction::Login)
                .user(user.id)
                .resource("user", user.id)
                .description("User logged in"),
        ))
        .await;

    Ok(Json(tokens))
}

/// POST /auth/refresh - rotate within the token's family
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = state.auth.keys().decode_token(&req.refresh_token)?;
    if !claims.is_refresh() {
        return Err(ApiError::unauthorized("Invalid token type"));
    }

    let user = match state.auth.validate_refresh_token(&claims).await {
        Ok(user) => user,
        Err(e) => {
            warn!(sub = %claims.sub, error = %e, "Refresh rejected");
            return Err(e.into());
        }
    };

    let tokens = state.auth.rotate_tokens(&user, claims.fam.as_deref()).await?;
    Ok(Json(tokens))
}

/// POST /auth/logout - invalidates every token of the user
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
) -> ApiResult<Json<Value>> {
    state.auth.logout(&user).await?;
    state
        .audit()
        .log(meta.audit(NewAuditLog::new(AuditAction::Logout).user(user.id)))
        .await;
    Ok(Json(json!({ "message": "Successfully logged out" })))
}

/// GET /auth/me
pub async fn me(CurrentUser(user): CurrentUser) -> Json<UserProfile> {
    Json(UserProfile::from(&user))
}

/// PATCH /auth/me
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    let updated = state
        .users()
        .update_profile(user.id, req.full_name, req.organization)
        .await?;
    Ok(Json(UserProfile::from(&updated)))
}

/// POST /auth/change-password
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    if !verify_password_async(req.current_password, user.hashed_password.clone()).await {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    state.auth.change_password(&user, &req.new_password).await?;
    state
        .audit()
        .log(meta.audit(
            NewAuditLog::new(AuditAction::PasswordChange)
                .user(user.id)
                .resource("user", user.id),
        ))
        .await;

    Ok(Json(json!({
        "message": "Password changed successfully. Please log in again."
    })))
}

/// POST /auth/api-key - the plain key is only ever returned here
pub async fn create_api_key(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
) -> ApiResult<Json<ApiKeyResponse>> {
    let api_key = state.auth.issue_api_key(&user).await?;
    state
        .audit()
        .log(meta.audit(NewAuditLog::new(AuditAction::ApiKeyCreate).user(user.id)))
        .await;

    Ok(Json(ApiKeyResponse {
        api_key,
        message: "Store this key securely. It will not be shown again.".into(),
    }))
}

/// DELETE /auth/api-key
pub async fn revoke_api_key(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    meta: RequestMeta,
) -> ApiResult<StatusCode> {
    state.auth.revoke_api_key(&user).await?;
    state
        .audit()
        .log(meta.audit(NewAuditLog::new(AuditAction::ApiKeyRevoke).user(user.id)))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_email() {
        assert!(looks_like_email("a@example.org"));
        assert!(!looks_like_email("a@localhost"));
        assert!(!looks_like_email("@example.org"));
        assert!(!looks_like_email("no-at-sign"));
        assert!(!looks_like_email("a b@example.org"));
    }
}
