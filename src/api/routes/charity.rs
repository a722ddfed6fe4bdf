//! Direct register lookups

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::charity_commission::{normalize_charity_number, CharityDetails};

/// GET /charity/{charity_number}
pub async fn details(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(charity_number): Path<String>,
) -> ApiResult<Json<CharityDetails>> {
    let number = normalize_charity_number(&charity_number);
    if number.is_empty() {
        return Err(ApiError::bad_request("Invalid charity number"));
    }

    state
        .registry
        .get_full_charity_details(&number)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Charity {} not found", number)))
}
