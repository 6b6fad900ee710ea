//! Prometheus metrics for monitoring.
//!
//! Exposes operational metrics at /metrics in Prometheus text format.
//! Tracks HTTP requests, listing verifications, bookings, and parking sessions.

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

// Metric names
pub const HTTP_REQUESTS_TOTAL: &str = "parkr_http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "parkr_http_request_duration_seconds";
pub const LISTING_VERIFICATIONS_TOTAL: &str = "parkr_listing_verifications_total";
pub const BOOKINGS_TOTAL: &str = "parkr_bookings_total";
pub const SESSION_CHECK_INS_TOTAL: &str = "parkr_session_check_ins_total";
pub const SESSION_CHECK_OUTS_TOTAL: &str = "parkr_session_check_outs_total";
pub const LISTINGS_ACTIVE: &str = "parkr_listings_active";
pub const SESSIONS_ACTIVE: &str = "parkr_sessions_active";

/// Install the Prometheus metrics recorder.
///
/// Returns a handle used to render the /metrics endpoint. If installation
/// fails (e.g., a recorder is already installed), metrics are disabled but
/// the server continues to run.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus metrics recorder installed");
            Some(handle)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install metrics recorder, /metrics will be unavailable");
            None
        }
    }
}

/// Render metrics in Prometheus text format.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => {
            update_gauge_metrics(&state).await;
            handle.render().into_response()
        }
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

/// Refresh gauges that reflect current database state.
async fn update_gauge_metrics(state: &AppState) {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM listings WHERE is_active = 1")
        .fetch_one(&state.db)
        .await
    {
        Ok(count) => gauge!(LISTINGS_ACTIVE).set(count as f64),
        Err(e) => tracing::warn!(error = %e, "Failed to count active listings"),
    }

    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE status = 'active'")
        .fetch_one(&state.db)
        .await
    {
        Ok(count) => gauge!(SESSIONS_ACTIVE).set(count as f64),
        Err(e) => tracing::warn!(error = %e, "Failed to count active sessions"),
    }
}

/// Middleware that records request counts and latencies per route.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    let duration = start.elapsed().as_secs_f64();

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

/// Record a listing verification run, labeled by the resulting recommendation.
pub fn record_verification(recommendation: &str) {
    counter!(LISTING_VERIFICATIONS_TOTAL, "recommendation" => recommendation.to_string())
        .increment(1);
}

/// Record a booking creation.
pub fn record_booking_created() {
    counter!(BOOKINGS_TOTAL, "status" => "created").increment(1);
}

/// Record a booking cancellation.
pub fn record_booking_cancelled() {
    counter!(BOOKINGS_TOTAL, "status" => "cancelled").increment(1);
}

/// Record a session check-in, labeled by session type (roadside or booked).
pub fn record_check_in(session_type: &str) {
    counter!(SESSION_CHECK_INS_TOTAL, "type" => session_type.to_string()).increment(1);
}

/// Record a session check-out.
pub fn record_check_out() {
    counter!(SESSION_CHECK_OUTS_TOTAL).increment(1);
}
