//! Persistence seam for the marketplace.
//!
//! All engine and API code talks to storage through [`ParkingStore`] so
//! the trust checks and the session state machine can be exercised
//! against an in-memory double while production runs on SQLite.

#[cfg(test)]
pub mod memory;
mod sqlite;

pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{
    Booking, BookingStatus, Host, Listing, ListingStatus, ParkingSession, Payment, Review,
};

/// Options for proximity queries
#[derive(Debug, Clone, Default)]
pub struct NearbyFilter {
    /// Listing to leave out of the results (the one being edited or verified)
    pub exclude_listing: Option<String>,
    /// Only return published listings whose slot is currently free
    pub active_available_only: bool,
}

/// A host together with every listing it owns
#[derive(Debug, Clone)]
pub struct HostProfile {
    pub host: Host,
    pub listings: Vec<Listing>,
}

/// Fields written when a session is closed out
#[derive(Debug, Clone)]
pub struct SessionCompletion {
    pub session_id: String,
    pub check_out_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub total_amount: f64,
}

#[async_trait]
pub trait ParkingStore: Send + Sync {
    // Listings
    async fn create_listing(&self, listing: &Listing) -> Result<()>;
    async fn find_listing(&self, id: &str) -> Result<Option<Listing>>;
    /// Delete a listing while its slot is free. Returns false when the
    /// listing does not exist or is currently reserved/occupied, in
    /// which case nothing was removed. The guard is conditional the
    /// same way the status transitions are, so a delete can never race
    /// an in-flight booking or session into an orphaned state.
    async fn delete_listing(&self, id: &str) -> Result<bool>;
    /// Listings within `radius_km` of a point, exact haversine distance
    async fn find_listings_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        filter: &NearbyFilter,
    ) -> Result<Vec<Listing>>;
    /// Atomically move a listing's slot status from one of `from` to `to`.
    /// Returns false when the current status was not in `from`, in which
    /// case nothing was written.
    async fn transition_listing_status(
        &self,
        id: &str,
        from: &[ListingStatus],
        to: ListingStatus,
    ) -> Result<bool>;
    async fn update_listing_rating(&self, id: &str, rating: f64) -> Result<()>;
    /// Listings this host created inside the trailing window
    async fn count_recent_listings_by_owner(
        &self,
        host_id: &str,
        window_minutes: i64,
    ) -> Result<i64>;

    // Hosts
    async fn create_host(&self, host: &Host) -> Result<()>;
    async fn find_host(&self, id: &str) -> Result<Option<Host>>;
    async fn find_host_profile(&self, id: &str) -> Result<Option<HostProfile>>;
    async fn set_host_active(&self, id: &str, active: bool) -> Result<bool>;

    // Bookings
    async fn create_booking(&self, booking: &Booking) -> Result<()>;
    async fn find_booking(&self, id: &str) -> Result<Option<Booking>>;
    /// Same contract as [`Self::transition_listing_status`], for bookings
    async fn transition_booking_status(
        &self,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<bool>;

    // Sessions
    async fn create_session(&self, session: &ParkingSession) -> Result<()>;
    async fn find_session(&self, id: &str) -> Result<Option<ParkingSession>>;
    /// Close out a session if and only if it is still active. Returns
    /// false when another check-out already won.
    async fn complete_session(&self, completion: &SessionCompletion) -> Result<bool>;
    /// Undo a completion, returning the session to active with its
    /// check-out fields cleared. Returns false when the session is not
    /// completed. Used to compensate when the settlement row cannot be
    /// written after the session already closed.
    async fn reopen_session(&self, id: &str) -> Result<bool>;

    // Payments and reviews
    async fn create_payment(&self, payment: &Payment) -> Result<()>;
    async fn create_review(&self, review: &Review) -> Result<()>;
    /// Every star rating ever left for a listing
    async fn list_review_scores(&self, listing_id: &str) -> Result<Vec<i64>>;
}
