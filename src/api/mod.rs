//! REST API for the enrichment service
//!
//! All routes live under `/api/v1`. Handlers authenticate through the
//! [`extract::CurrentUser`] extractor and return [`error::ApiError`] on failure.

pub mod error;
pub mod extract;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use router::{build_app, API_PREFIX};
pub use state::AppState;
