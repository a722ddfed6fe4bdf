//! HTTP error responses
//!
//! Every failure is rendered as `{"detail": "..."}` with the matching status.

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::error::{AuthError, ResolutionError, UploadError};

pub const REQUIRE_2FA_HEADER: &str = "x-require-2fa";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    PayloadTooLarge(String),
    TooManyRequests { detail: String, retry_after: u64 },
    /// Password accepted but a second factor is needed
    TwoFactorRequired,
    ServiceUnavailable(String),
    Internal(anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        ApiError::BadRequest(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        ApiError::NotFound(detail.into())
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        ApiError::Unauthorized(detail.into())
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        ApiError::Forbidden(detail.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::TwoFactorRequired => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::BadRequest(d)
            | ApiError::Unauthorized(d)
            | ApiError::Forbidden(d)
            | ApiError::NotFound(d)
            | ApiError::PayloadTooLarge(d)
            | ApiError::ServiceUnavailable(d) => d.clone(),
            ApiError::TooManyRequests { detail, .. } => detail.clone(),
            ApiError::TwoFactorRequired => "Two-factor authentication code required".to_string(),
            ApiError::Internal(e) => {
                error!(error = ?e, "Internal error");
                "Internal server error".to_string()
            }
        };

        let mut response = (status, Json(json!({ "detail": detail }))).into_response();
        let headers = response.headers_mut();
        match &self {
            ApiError::Unauthorized(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            ApiError::TooManyRequests { retry_after, .. } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            ApiError::TwoFactorRequired => {
                headers.insert(
                    HeaderName::from_static(REQUIRE_2FA_HEADER),
                    HeaderValue::from_static("true"),
                );
            }
            _ => {}
        }
        response
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.into())
    }
}

impl From<ResolutionError> for ApiError {
    fn from(e: ResolutionError) -> Self {
        match e {
            ResolutionError::EntityNotFound(_) => ApiError::not_found("Entity not found"),
            ResolutionError::CandidateNotFound(_) => {
                ApiError::not_found("Resolution candidate not found")
            }
            ResolutionError::CharityNotFound(n) => {
                ApiError::not_found(format!("Charity {} not found", n))
            }
            ResolutionError::Other(e) => ApiError::Internal(e),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::TokenInvalidated
            | AuthError::TokenReuse => ApiError::Unauthorized(e.to_string()),
            AuthError::Inactive => ApiError::Forbidden(e.to_string()),
            AuthError::WeakPassword(msg) => ApiError::BadRequest(msg),
            AuthError::TwoFactor(msg) => ApiError::BadRequest(msg),
            AuthError::Hash(_) | AuthError::Jwt(_) => ApiError::Internal(anyhow::anyhow!(e)),
            AuthError::Other(e) => ApiError::Internal(e),
        }
    }
}
