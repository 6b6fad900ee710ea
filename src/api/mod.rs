mod bookings;
pub mod error;
mod hosts;
mod listings;
pub mod metrics;
mod reviews;
mod sessions;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Hosts
        .route("/hosts", post(hosts::create_host))
        .route("/hosts/:id", get(hosts::get_host))
        .route("/hosts/:id/active", put(hosts::set_host_active))
        // Listings
        .route("/listings", post(listings::create_listing))
        .route("/listings/verify", post(listings::verify_listing))
        .route("/listings/nearby", get(listings::nearby_listings))
        .route("/listings/:id", get(listings::get_listing))
        .route("/listings/:id", delete(listings::delete_listing))
        .route("/listings/:id/token", get(listings::issue_token))
        .route("/listings/:id/reviews", post(reviews::create_review))
        // Bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/:id/cancel", post(bookings::cancel_booking))
        // Sessions
        .route("/sessions/check-in", post(sessions::check_in))
        .route("/sessions/:id/check-out", post(sessions::check_out));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
