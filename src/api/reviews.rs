use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::CreateReviewRequest;
use crate::engine::ReviewOutcome;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

fn validate_create_request(req: &CreateReviewRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.user_id.trim().is_empty() {
        errors.add("user_id", "User id must not be empty");
    }

    errors.finish()
}

/// Leave a star rating on a listing. The listing's mean rating is
/// recomputed over the full review set and returned alongside.
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    Path(listing_id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewOutcome>), ApiError> {
    validate_create_request(&req)?;

    let outcome = state.lifecycle.submit_review(&listing_id, &req).await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}
