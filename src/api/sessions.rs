use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{CheckInRequest, CheckOutRequest, ParkingSession, Payment};
use crate::engine::CheckoutSummary;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

/// Closed session plus its settlement, with the billed figures lifted
/// out for convenience
#[derive(Debug, Serialize)]
pub struct CheckOutResponse {
    pub session: ParkingSession,
    pub payment: Payment,
    pub duration_minutes: i64,
    pub total_amount: f64,
}

impl From<CheckoutSummary> for CheckOutResponse {
    fn from(summary: CheckoutSummary) -> Self {
        Self {
            duration_minutes: summary.session.duration_minutes.unwrap_or(0),
            total_amount: summary.payment.amount,
            session: summary.session,
            payment: summary.payment,
        }
    }
}

fn validate_check_in_request(req: &CheckInRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.token.trim().is_empty() {
        errors.add("token", "Token must not be empty");
    }
    if req.user_id.trim().is_empty() {
        errors.add("user_id", "User id must not be empty");
    }

    errors.finish()
}

/// Open a parking session from a scanned slot token, redeeming a
/// booking when one is supplied.
pub async fn check_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<ParkingSession>), ApiError> {
    validate_check_in_request(&req)?;

    let session = state.lifecycle.check_in(&req).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Close a session, bill the elapsed time and free the slot.
pub async fn check_out(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CheckOutRequest>,
) -> Result<Json<CheckOutResponse>, ApiError> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::validation_field(
            "user_id",
            "User id must not be empty",
        ));
    }

    let summary = state.lifecycle.check_out(&id, &req.user_id).await?;

    Ok(Json(summary.into()))
}
