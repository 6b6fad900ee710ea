//! In-memory [`ParkingStore`] used by engine tests.
//!
//! A single mutex guards all tables, which makes every status
//! transition atomic the same way the conditional UPDATEs are in
//! SQLite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{HostProfile, NearbyFilter, ParkingStore, SessionCompletion};
use crate::db::{
    Booking, BookingStatus, Host, Listing, ListingStatus, ParkingSession, Payment, Review,
    SessionStatus,
};
use crate::engine::geo;

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_nearby: AtomicBool,
    fail_next_payment: AtomicBool,
}

#[derive(Default)]
struct Inner {
    hosts: HashMap<String, Host>,
    listings: HashMap<String, Listing>,
    bookings: HashMap<String, Booking>,
    sessions: HashMap<String, ParkingSession>,
    payments: Vec<Payment>,
    reviews: Vec<Review>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make proximity queries fail, to exercise degraded verification
    pub fn fail_nearby_queries(&self) {
        self.fail_nearby.store(true, Ordering::SeqCst);
    }

    /// Fail the next payment insert only, to exercise check-out
    /// compensation and the retry after it
    pub fn fail_next_payment_insert(&self) {
        self.fail_next_payment.store(true, Ordering::SeqCst);
    }

    /// Snapshot of the payment ledger
    pub fn payments(&self) -> Vec<Payment> {
        self.inner.lock().unwrap().payments.clone()
    }
}

#[async_trait]
impl ParkingStore for MemoryStore {
    async fn create_listing(&self, listing: &Listing) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .listings
            .insert(listing.id.clone(), listing.clone());
        Ok(())
    }

    async fn find_listing(&self, id: &str) -> Result<Option<Listing>> {
        Ok(self.inner.lock().unwrap().listings.get(id).cloned())
    }

    async fn delete_listing(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.listings.get(id) {
            Some(l) if l.status_enum() == ListingStatus::Available => {
                inner.listings.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_listings_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        filter: &NearbyFilter,
    ) -> Result<Vec<Listing>> {
        if self.fail_nearby.load(Ordering::SeqCst) {
            bail!("injected proximity query failure");
        }
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .listings
            .values()
            .filter(|l| Some(l.id.as_str()) != filter.exclude_listing.as_deref())
            .filter(|l| {
                !filter.active_available_only
                    || (l.active() && l.status_enum() == ListingStatus::Available)
            })
            .filter(|l| geo::haversine_km(latitude, longitude, l.latitude, l.longitude) <= radius_km)
            .cloned()
            .collect())
    }

    async fn transition_listing_status(
        &self,
        id: &str,
        from: &[ListingStatus],
        to: ListingStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(listing) = inner.listings.get_mut(id) else {
            return Ok(false);
        };
        if !from.contains(&listing.status_enum()) {
            return Ok(false);
        }
        listing.status = to.as_str().to_string();
        Ok(true)
    }

    async fn update_listing_rating(&self, id: &str, rating: f64) -> Result<()> {
        if let Some(listing) = self.inner.lock().unwrap().listings.get_mut(id) {
            listing.rating = Some(rating);
        }
        Ok(())
    }

    async fn count_recent_listings_by_owner(
        &self,
        host_id: &str,
        window_minutes: i64,
    ) -> Result<i64> {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .listings
            .values()
            .filter(|l| l.host_id == host_id && l.created_at >= cutoff)
            .count() as i64)
    }

    async fn create_host(&self, host: &Host) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .hosts
            .insert(host.id.clone(), host.clone());
        Ok(())
    }

    async fn find_host(&self, id: &str) -> Result<Option<Host>> {
        Ok(self.inner.lock().unwrap().hosts.get(id).cloned())
    }

    async fn find_host_profile(&self, id: &str) -> Result<Option<HostProfile>> {
        let inner = self.inner.lock().unwrap();
        let Some(host) = inner.hosts.get(id).cloned() else {
            return Ok(None);
        };
        let listings = inner
            .listings
            .values()
            .filter(|l| l.host_id == id)
            .cloned()
            .collect();
        Ok(Some(HostProfile { host, listings }))
    }

    async fn set_host_active(&self, id: &str, active: bool) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(host) = inner.hosts.get_mut(id) else {
            return Ok(false);
        };
        host.is_active = active as i32;
        Ok(true)
    }

    async fn create_booking(&self, booking: &Booking) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .bookings
            .insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn find_booking(&self, id: &str) -> Result<Option<Booking>> {
        Ok(self.inner.lock().unwrap().bookings.get(id).cloned())
    }

    async fn transition_booking_status(
        &self,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(booking) = inner.bookings.get_mut(id) else {
            return Ok(false);
        };
        if !from.contains(&booking.status_enum()) {
            return Ok(false);
        }
        booking.status = to.as_str().to_string();
        Ok(true)
    }

    async fn create_session(&self, session: &ParkingSession) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, id: &str) -> Result<Option<ParkingSession>> {
        Ok(self.inner.lock().unwrap().sessions.get(id).cloned())
    }

    async fn complete_session(&self, completion: &SessionCompletion) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions.get_mut(&completion.session_id) else {
            return Ok(false);
        };
        if session.status_enum() != SessionStatus::Active {
            return Ok(false);
        }
        session.status = SessionStatus::Completed.as_str().to_string();
        session.check_out_time = Some(completion.check_out_time);
        session.duration_minutes = Some(completion.duration_minutes);
        session.total_amount = Some(completion.total_amount);
        Ok(true)
    }

    async fn reopen_session(&self, id: &str) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(session) = inner.sessions.get_mut(id) else {
            return Ok(false);
        };
        if session.status_enum() != SessionStatus::Completed {
            return Ok(false);
        }
        session.status = SessionStatus::Active.as_str().to_string();
        session.check_out_time = None;
        session.duration_minutes = None;
        session.total_amount = None;
        Ok(true)
    }

    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        if self.fail_next_payment.swap(false, Ordering::SeqCst) {
            bail!("injected payment insert failure");
        }
        self.inner.lock().unwrap().payments.push(payment.clone());
        Ok(())
    }

    async fn create_review(&self, review: &Review) -> Result<()> {
        self.inner.lock().unwrap().reviews.push(review.clone());
        Ok(())
    }

    async fn list_review_scores(&self, listing_id: &str) -> Result<Vec<i64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .reviews
            .iter()
            .filter(|r| r.listing_id == listing_id)
            .map(|r| r.rating)
            .collect())
    }
}
