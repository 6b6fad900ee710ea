use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    CreateListingRequest, Listing, ListingDraft, ListingResponse, VerifyListingRequest,
};
use crate::engine::VerificationReport;
use crate::store::NearbyFilter;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::metrics;

fn default_radius_km() -> f64 {
    2.0
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
}

/// Created listing plus the verification report that gated it
#[derive(Debug, Serialize)]
pub struct CreateListingResponse {
    pub listing: ListingResponse,
    pub verification: VerificationReport,
}

/// Signed token for the slot's QR code
#[derive(Debug, Serialize)]
pub struct SlotTokenResponse {
    pub listing_id: String,
    pub token: String,
}

/// Reject NaN and infinities before they reach the numeric trust checks
fn validate_draft(draft: &ListingDraft, errors: &mut ValidationErrorBuilder) {
    if !draft.hourly_price.is_finite() {
        errors.add("hourly_price", "Hourly price must be a finite number");
    }
    if !draft.latitude.is_finite() {
        errors.add("latitude", "Latitude must be a finite number");
    }
    if !draft.longitude.is_finite() {
        errors.add("longitude", "Longitude must be a finite number");
    }
}

fn validate_create_request(req: &CreateListingRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.host_id.trim().is_empty() {
        errors.add("host_id", "Host id must not be empty");
    }
    validate_draft(&req.draft, &mut errors);

    errors.finish()
}

fn validate_verify_request(req: &VerifyListingRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.host_id.trim().is_empty() {
        errors.add("host_id", "Host id must not be empty");
    }
    validate_draft(&req.draft, &mut errors);

    errors.finish()
}

/// Create a listing, gated by trust verification. The report decides
/// whether the listing goes live immediately or waits for approval.
pub async fn create_listing(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<CreateListingResponse>), ApiError> {
    validate_create_request(&req)?;

    let report = state.verifier.verify(&req.draft, &req.host_id, None).await;
    metrics::record_verification(report.recommendation.as_str());

    let listing = Listing::new(
        &req.host_id,
        &req.draft,
        &req.amenities,
        report.should_auto_approve(),
    );
    state.store.create_listing(&listing).await?;

    tracing::info!(
        listing_id = %listing.id,
        host_id = %listing.host_id,
        published = listing.active(),
        "Listing created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateListingResponse {
            listing: listing.into(),
            verification: report,
        }),
    ))
}

/// Run the trust checks without persisting anything.
pub async fn verify_listing(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyListingRequest>,
) -> Result<Json<VerificationReport>, ApiError> {
    validate_verify_request(&req)?;

    let report = state
        .verifier
        .verify(&req.draft, &req.host_id, req.exclude_listing_id.as_deref())
        .await;
    metrics::record_verification(report.recommendation.as_str());

    Ok(Json(report))
}

pub async fn get_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ListingResponse>, ApiError> {
    let listing = state
        .store
        .find_listing(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Listing not found"))?;

    Ok(Json(listing.into()))
}

/// Remove a listing. A reserved or occupied slot cannot be deleted;
/// the booking or session holding it has to finish first.
pub async fn delete_listing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.store.delete_listing(&id).await?;
    if !deleted {
        // The conditional delete is authoritative; this read only picks
        // the right error for the caller
        return Err(match state.store.find_listing(&id).await? {
            Some(_) => ApiError::conflict("Listing has an open booking or session"),
            None => ApiError::not_found("Listing not found"),
        });
    }

    tracing::info!(listing_id = %id, "Listing deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Published, currently-free listings within the requested radius.
pub async fn nearby_listings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<ListingResponse>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if !query.lat.is_finite() {
        errors.add("lat", "Latitude must be a finite number");
    }
    if !query.lon.is_finite() {
        errors.add("lon", "Longitude must be a finite number");
    }
    if !query.radius_km.is_finite() || query.radius_km <= 0.0 {
        errors.add("radius_km", "Radius must be a positive number");
    }
    errors.finish()?;

    let filter = NearbyFilter {
        exclude_listing: None,
        active_available_only: true,
    };
    let listings = state
        .store
        .find_listings_near(query.lat, query.lon, query.radius_km, &filter)
        .await?;

    Ok(Json(listings.into_iter().map(Into::into).collect()))
}

/// Issue the signed token embedded in the slot's printed QR code.
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SlotTokenResponse>, ApiError> {
    let listing = state
        .store
        .find_listing(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Listing not found"))?;

    let token = state.codec.issue(&listing.id);

    Ok(Json(SlotTokenResponse {
        listing_id: listing.id,
        token,
    }))
}
