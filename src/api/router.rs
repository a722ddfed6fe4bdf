//! Router construction for the enrichment API

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_mw,
    routing::{get, patch, post},
    Router,
};

use super::middleware::{csrf_protect, security_headers};
use super::routes::{admin, auth, batches, charity, entities, exports, health, two_factor};
use super::state::AppState;

pub const API_PREFIX: &str = "/api/v1";

/// Multipart framing on top of the configured file size
const UPLOAD_BODY_OVERHEAD: usize = 64 * 1024;

/// Build the `/api/v1` router with security middleware applied.
///
/// CORS and request tracing are left to the binary.
pub fn build_app(state: AppState) -> Router {
    let upload_limit = state.settings.max_upload_bytes() + UPLOAD_BODY_OVERHEAD;

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live));

    let auth_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me).patch(auth::update_me))
        .route("/auth/change-password", post(auth::change_password))
        .route(
            "/auth/api-key",
            post(auth::create_api_key).delete(auth::revoke_api_key),
        )
        .route("/2fa/setup", post(two_factor::setup))
        .route("/2fa/verify", post(two_factor::verify))
        .route("/2fa/disable", post(two_factor::disable))
        .route("/2fa/status", get(two_factor::status));

    let admin_routes = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id", patch(admin::update_user));

    let batch_routes = Router::new()
        .route(
            "/batches/upload",
            post(batches::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/batches", get(batches::list))
        .route("/batches/:id", get(batches::get).delete(batches::delete))
        .route("/batches/:id/process", post(batches::process))
        .route("/batches/:id/reprocess", post(batches::reprocess));

    let entity_routes = Router::new()
        .route("/entities/batch/:batch_id", get(entities::list_for_batch))
        .route("/entities/batch/:batch_id/stats", get(entities::batch_stats))
        .route("/entities/:id", get(entities::get).patch(entities::update))
        .route("/entities/:id/resolutions", get(entities::resolutions))
        .route("/entities/:id/confirm", post(entities::confirm))
        .route("/entities/:id/re-resolve", post(entities::re_resolve))
        .route("/entities/:id/ownership-tree", get(entities::ownership_tree))
        .route(
            "/entities/:id/build-ownership-tree",
            post(entities::build_ownership_tree),
        );

    let export_routes = Router::new()
        .route("/exports/excel", post(exports::excel))
        .route("/exports/csv", post(exports::csv))
        .route(
            "/exports/batch/:id/quick-export",
            get(exports::quick_export),
        )
        .route("/charity/:charity_number", get(charity::details));

    let api = Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(batch_routes)
        .merge(entity_routes)
        .merge(export_routes);

    Router::new()
        .nest(API_PREFIX, api)
        .layer(axum_mw::from_fn_with_state(state.clone(), csrf_protect))
        .layer(axum_mw::from_fn(security_headers))
        .with_state(state)
}
