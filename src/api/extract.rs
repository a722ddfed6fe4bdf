//! Request extractors: authenticated users and client metadata

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

use super::error::ApiError;
use super::state::AppState;
use crate::error::AuthError;
use crate::models::{NewAuditLog, User};

/// Bearer token from an `Authorization` header, if present
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The authenticated, active caller.
///
/// Accepts a bearer access token or the configured API key header.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers) {
            return match state.auth.user_for_access_token(token).await {
                Ok(user) => Ok(CurrentUser(user)),
                Err(AuthError::Inactive) => Err(ApiError::forbidden("User account is inactive")),
                Err(AuthError::Other(e)) => Err(ApiError::Internal(e)),
                Err(_) => Err(ApiError::unauthorized("Could not validate credentials")),
            };
        }

        let api_key = parts
            .headers
            .get(state.settings.api_key_header.as_str())
            .and_then(|v| v.to_str().ok())
            .filter(|k| !k.is_empty());
        if let Some(key) = api_key {
            return match state.auth.user_for_api_key(key).await? {
                Some(user) => Ok(CurrentUser(user)),
                None => Err(ApiError::unauthorized("Invalid API key")),
            };
        }

        Err(ApiError::unauthorized("Not authenticated"))
    }
}

/// An authenticated superuser
#[derive(Debug, Clone)]
pub struct SuperUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for SuperUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        require_superuser(user).map(SuperUser)
    }
}

pub fn require_superuser(user: User) -> Result<User, ApiError> {
    if !user.is_superuser {
        return Err(ApiError::forbidden("Not enough permissions"));
    }
    Ok(user)
}

/// Method, path, client address and user agent for audit rows
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestMeta {
    pub fn audit(&self, entry: NewAuditLog) -> NewAuditLog {
        entry.request(&self.method, &self.path, self.ip.clone(), self.user_agent.clone())
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer
pub fn client_ip(parts: &Parts) -> Option<String> {
    let header_value = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .or_else(|| header_value("x-real-ip"))
        .or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RequestMeta {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            ip: client_ip(parts),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/batches");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token() {
        let p = parts(&[("authorization", "Bearer abc.def")]);
        assert_eq!(bearer_token(&p.headers), Some("abc.def"));
        let p = parts(&[("authorization", "Basic xyz")]);
        assert_eq!(bearer_token(&p.headers), None);
        let p = parts(&[("authorization", "Bearer ")]);
        assert_eq!(bearer_token(&p.headers), None);
    }

    fn user(is_superuser: bool) -> User {
        let now = chrono::Utc::now();
        User {
            id: uuid::Uuid::new_v4(),
            email: "admin@example.org".into(),
            hashed_password: String::new(),
            full_name: None,
            organization: None,
            is_active: true,
            is_superuser,
            is_verified: true,
            api_key_hash: None,
            api_key_prefix: None,
            api_key_created_at: None,
            token_version: 0,
            refresh_token_family: None,
            current_refresh_jti: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            backup_codes: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    #[test]
    fn test_require_superuser() {
        assert!(require_superuser(user(true)).is_ok());
        match require_superuser(user(false)) {
            Err(ApiError::Forbidden(detail)) => assert_eq!(detail, "Not enough permissions"),
            other => panic!("expected 403, got {:?}", other.map(|u| u.email)),
        }
    }

    #[test]
    fn test_client_ip_precedence() {
        let p = parts(&[("x-forwarded-for", "1.2.3.4, 10.0.0.1"), ("x-real-ip", "5.6.7.8")]);
        assert_eq!(client_ip(&p).as_deref(), Some("1.2.3.4"));
        let p = parts(&[("x-real-ip", "5.6.7.8")]);
        assert_eq!(client_ip(&p).as_deref(), Some("5.6.7.8"));
        assert_eq!(client_ip(&parts(&[])), None);
    }
}
