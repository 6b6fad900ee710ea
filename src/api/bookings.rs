use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{Booking, CancelBookingRequest, CreateBookingRequest};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

fn validate_create_request(req: &CreateBookingRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.listing_id.trim().is_empty() {
        errors.add("listing_id", "Listing id must not be empty");
    }
    if req.user_id.trim().is_empty() {
        errors.add("user_id", "User id must not be empty");
    }

    errors.finish()
}

/// Reserve a slot for a future window. Fails with 409 when the slot is
/// already reserved or occupied.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    validate_create_request(&req)?;

    let booking = state.lifecycle.create_booking(&req).await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<Json<Booking>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::validation_field(
            "user_id",
            "User id must not be empty",
        ));
    }

    let booking = state.lifecycle.cancel_booking(&id, &req.user_id).await?;

    Ok(Json(booking))
}
