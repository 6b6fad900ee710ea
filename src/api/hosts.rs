use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{CreateHostRequest, Host, HostResponse, ListingResponse, UpdateHostActiveRequest};
use crate::store::HostProfile;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

/// Host profile returned by GET, with every listing the host owns
#[derive(Debug, Serialize)]
pub struct HostProfileResponse {
    #[serde(flatten)]
    pub host: HostResponse,
    pub listings: Vec<ListingResponse>,
}

impl From<HostProfile> for HostProfileResponse {
    fn from(profile: HostProfile) -> Self {
        Self {
            host: profile.host.into(),
            listings: profile.listings.into_iter().map(Into::into).collect(),
        }
    }
}

fn validate_create_request(req: &CreateHostRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if req.name.trim().is_empty() {
        errors.add("name", "Name must not be empty");
    }

    errors.finish()
}

pub async fn create_host(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateHostRequest>,
) -> Result<(StatusCode, Json<HostResponse>), ApiError> {
    validate_create_request(&req)?;

    let host = Host::new(req.name.trim());
    state.store.create_host(&host).await?;

    tracing::info!(host_id = %host.id, "Host created");

    Ok((StatusCode::CREATED, Json(host.into())))
}

pub async fn get_host(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HostProfileResponse>, ApiError> {
    let profile = state
        .store
        .find_host_profile(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Host not found"))?;

    Ok(Json(profile.into()))
}

pub async fn set_host_active(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateHostActiveRequest>,
) -> Result<Json<HostResponse>, ApiError> {
    let updated = state.store.set_host_active(&id, req.active).await?;
    if !updated {
        return Err(ApiError::not_found("Host not found"));
    }

    tracing::info!(host_id = %id, active = req.active, "Host active flag updated");

    let host = state
        .store
        .find_host(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Host not found"))?;

    Ok(Json(host.into()))
}
