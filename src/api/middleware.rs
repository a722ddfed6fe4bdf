//! Security headers and CSRF double-submit protection

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rand::RngCore;
use serde_json::json;
use tracing::warn;

use super::extract::bearer_token;
use super::state::AppState;

pub const CSRF_COOKIE_NAME: &str = "csrf_token";
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Unsafe requests to these paths need no CSRF token
const CSRF_EXEMPT_PATHS: [&str; 4] = [
    "/api/v1/health",
    "/api/v1/auth/login",
    "/api/v1/auth/register",
    "/api/v1/auth/refresh",
];

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self'; \
    style-src 'self'; img-src 'self' data: https:; connect-src 'self'; \
    frame-ancestors 'none'; form-action 'self'; base-uri 'self'";

pub async fn security_headers(request: Request, next: Next) -> Response {
    let is_api = request.uri().path().starts_with("/api/");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    let set = |headers: &mut HeaderMap, name: &'static str, value: &'static str| {
        headers.insert(name, HeaderValue::from_static(value));
    };
    set(headers, "x-frame-options", "DENY");
    set(headers, "x-content-type-options", "nosniff");
    set(headers, "x-xss-protection", "1; mode=block");
    set(headers, "referrer-policy", "strict-origin-when-cross-origin");
    set(
        headers,
        "strict-transport-security",
        "max-age=63072000; includeSubDomains; preload",
    );
    set(headers, "content-security-policy", CONTENT_SECURITY_POLICY);
    set(
        headers,
        "permissions-policy",
        "geolocation=(), microphone=(), camera=(), payment=(), usb=()",
    );
    set(headers, "cross-origin-opener-policy", "same-origin");
    set(headers, "x-permitted-cross-domain-policies", "none");

    if is_api {
        set(headers, "cache-control", "no-store, no-cache, must-revalidate, private");
        set(headers, "pragma", "no-cache");
    }

    response
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a.bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

fn is_exempt(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    CSRF_EXEMPT_PATHS.iter().any(|p| path.starts_with(p))
}

fn forbidden(detail: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "detail": detail }))).into_response()
}

/// Double-submit cookie check.
///
/// Safe methods get a `csrf_token` cookie when they lack one. Unsafe methods
/// must echo it in `X-CSRF-Token` unless they carry a bearer token or API key,
/// which a browser never attaches on its own.
pub async fn csrf_protect(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let safe = matches!(
        method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    );
    let cookie = cookie_value(request.headers(), CSRF_COOKIE_NAME).map(str::to_string);

    if !safe && !is_exempt(request.uri().path()) {
        let headers = request.headers();
        let has_credentials = bearer_token(headers).is_some()
            || headers.contains_key(state.settings.api_key_header.as_str());

        if !has_credentials {
            let header_token = headers.get(CSRF_HEADER_NAME).and_then(|v| v.to_str().ok());
            match (cookie.as_deref(), header_token) {
                (Some(c), Some(h)) if constant_time_eq(c, h) => {}
                (Some(_), Some(_)) => {
                    warn!(path = %request.uri().path(), "CSRF validation failed - token mismatch");
                    return forbidden("CSRF token invalid");
                }
                (c, h) => {
                    warn!(
                        path = %request.uri().path(),
                        has_cookie = c.is_some(),
                        has_header = h.is_some(),
                        "CSRF validation failed - missing token"
                    );
                    return forbidden("CSRF token missing");
                }
            }
        }
    }

    let mut response = next.run(request).await;

    if cookie.is_none() {
        let mut value = format!(
            "{}={}; Path=/; Max-Age={}; SameSite=Strict",
            CSRF_COOKIE_NAME,
            generate_csrf_token(),
            state.settings.access_token_ttl().as_secs()
        );
        if state.settings.is_production() {
            value.push_str("; Secure");
        }
        if let Ok(v) = HeaderValue::from_str(&value) {
            response.headers_mut().append(header::SET_COOKIE, v);
        }
    }

    response
}
