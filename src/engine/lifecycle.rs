//! Booking and parking session state machine.
//!
//! All slot, booking and session transitions go through here. Writers
//! never trust a status they read: every transition is a conditional
//! update in the store, and a transition that matches zero rows means
//! another request got there first. That is what serializes two users
//! booking the same slot or the same user double-tapping check-out.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::api::metrics;
use crate::db::{
    Booking, BookingStatus, CheckInRequest, CreateBookingRequest, CreateReviewRequest, Listing,
    ListingStatus, ParkingSession, Payment, PaymentStatus, Review, SessionStatus, SessionType,
};
use crate::engine::fees;
use crate::engine::token::{SlotTokenCodec, TokenError};
use crate::store::{ParkingStore, SessionCompletion};

/// Star ratings accepted on a review
const RATING_MIN: i64 = 1;
const RATING_MAX: i64 = 5;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0} does not belong to this user")]
    Unauthorized(&'static str),
    #[error("Slot is not available")]
    SlotUnavailable,
    #[error("Session is not active")]
    SessionNotActive,
    #[error("{0}")]
    InvalidBooking(&'static str),
    #[error("{0}")]
    ValidationFailed(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("Storage error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Everything a client needs after closing out a stay
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSummary {
    pub session: ParkingSession,
    pub payment: Payment,
}

/// A stored review plus the listing's refreshed mean rating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub review: Review,
    pub listing_rating: f64,
}

#[derive(Clone)]
pub struct SessionLifecycle {
    store: Arc<dyn ParkingStore>,
    codec: SlotTokenCodec,
}

impl SessionLifecycle {
    pub fn new(store: Arc<dyn ParkingStore>, codec: SlotTokenCodec) -> Self {
        Self { store, codec }
    }

    /// Reserve a published slot for a future window. The slot flips
    /// available -> reserved atomically; losing that race returns
    /// [`LifecycleError::SlotUnavailable`].
    pub async fn create_booking(
        &self,
        req: &CreateBookingRequest,
    ) -> Result<Booking, LifecycleError> {
        let listing = self
            .store
            .find_listing(&req.listing_id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        if !listing.active() {
            return Err(LifecycleError::SlotUnavailable);
        }
        if req.start_time >= req.end_time {
            return Err(LifecycleError::ValidationFailed(
                "start_time must be earlier than end_time".to_string(),
            ));
        }

        let split = fees::split(listing.hourly_price, req.start_time, req.end_time);

        let reserved = self
            .store
            .transition_listing_status(
                &listing.id,
                &[ListingStatus::Available],
                ListingStatus::Reserved,
            )
            .await?;
        if !reserved {
            return Err(LifecycleError::SlotUnavailable);
        }

        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            listing_id: listing.id.clone(),
            user_id: req.user_id.clone(),
            start_time: req.start_time,
            end_time: req.end_time,
            price: split.gross_price,
            platform_fee: split.platform_fee,
            host_earnings: split.host_earnings,
            status: BookingStatus::Confirmed.as_str().to_string(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create_booking(&booking).await {
            // Give the slot back before surfacing the failure
            if let Err(revert) = self
                .store
                .transition_listing_status(
                    &listing.id,
                    &[ListingStatus::Reserved],
                    ListingStatus::Available,
                )
                .await
            {
                tracing::warn!(listing_id = %listing.id, error = %revert, "Failed to release slot after booking insert failed");
            }
            return Err(e.into());
        }

        metrics::record_booking_created();
        tracing::info!(
            booking_id = %booking.id,
            listing_id = %listing.id,
            user_id = %req.user_id,
            hours = split.duration_hours,
            "Booking confirmed"
        );
        Ok(booking)
    }

    /// Open a parking session from a scanned slot token, either as a
    /// walk-up or by redeeming a booking.
    pub async fn check_in(&self, req: &CheckInRequest) -> Result<ParkingSession, LifecycleError> {
        let claims = self.codec.validate(&req.token)?;

        let listing = self
            .store
            .find_listing(&claims.slot_id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        let booking = match &req.booking_id {
            Some(booking_id) => {
                let booking = self
                    .store
                    .find_booking(booking_id)
                    .await?
                    .ok_or(LifecycleError::NotFound("Booking"))?;
                if booking.user_id != req.user_id {
                    return Err(LifecycleError::InvalidBooking(
                        "Booking belongs to a different user",
                    ));
                }
                if booking.listing_id != listing.id {
                    return Err(LifecycleError::InvalidBooking(
                        "Booking is for a different slot",
                    ));
                }
                // Claim the booking first; the conditional update loses
                // against a concurrent cancel or redeem
                let claimed = self
                    .store
                    .transition_booking_status(
                        booking_id,
                        &[BookingStatus::Pending, BookingStatus::Confirmed],
                        BookingStatus::Active,
                    )
                    .await?;
                if !claimed {
                    return Err(LifecycleError::InvalidBooking("Booking is not open"));
                }
                Some(booking)
            }
            None => None,
        };

        let occupied = self
            .store
            .transition_listing_status(
                &listing.id,
                &[ListingStatus::Available, ListingStatus::Reserved],
                ListingStatus::Occupied,
            )
            .await?;
        if !occupied {
            if let Some(booking) = &booking {
                self.release_booking_claim(&booking.id).await;
            }
            return Err(LifecycleError::SlotUnavailable);
        }

        let session_type = match booking {
            Some(_) => SessionType::Booked,
            None => SessionType::Roadside,
        };
        let session = ParkingSession {
            id: Uuid::new_v4().to_string(),
            listing_id: listing.id.clone(),
            user_id: req.user_id.clone(),
            booking_id: req.booking_id.clone(),
            session_type: session_type.as_str().to_string(),
            check_in_time: Utc::now(),
            check_out_time: None,
            duration_minutes: None,
            total_amount: None,
            status: SessionStatus::Active.as_str().to_string(),
        };
        if let Err(e) = self.store.create_session(&session).await {
            self.release_slot_after_failed_check_in(&listing, req.booking_id.as_deref())
                .await;
            return Err(e.into());
        }

        metrics::record_check_in(session_type.as_str());
        tracing::info!(
            session_id = %session.id,
            listing_id = %listing.id,
            user_id = %req.user_id,
            session_type = %session_type,
            "Session started"
        );
        Ok(session)
    }

    /// Close an active session, bill the stay and write the settlement
    /// row. Exactly one of two concurrent check-outs wins the
    /// conditional update; the loser sees the session as no longer
    /// active.
    pub async fn check_out(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<CheckoutSummary, LifecycleError> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .ok_or(LifecycleError::NotFound("Session"))?;

        if session.user_id != user_id {
            return Err(LifecycleError::Unauthorized("Session"));
        }
        if session.status_enum() != SessionStatus::Active {
            return Err(LifecycleError::SessionNotActive);
        }

        let listing = self
            .store
            .find_listing(&session.listing_id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        let check_out_time = Utc::now();
        let duration_minutes = fees::elapsed_minutes(session.check_in_time, check_out_time);
        let billable_hours = fees::billable_hours(duration_minutes);
        let total_amount = listing.hourly_price * billable_hours as f64;
        let (platform_fee, host_earnings) = fees::split_amount(total_amount);

        let completed = self
            .store
            .complete_session(&SessionCompletion {
                session_id: session.id.clone(),
                check_out_time,
                duration_minutes,
                total_amount,
            })
            .await?;
        if !completed {
            return Err(LifecycleError::SessionNotActive);
        }

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            session_id: session.id.clone(),
            booking_id: session.booking_id.clone(),
            amount: total_amount,
            platform_fee,
            host_earnings,
            status: PaymentStatus::Pending.as_str().to_string(),
            created_at: check_out_time,
        };
        if let Err(e) = self.store.create_payment(&payment).await {
            // Put the session back so a retried check-out can settle it;
            // the slot is still occupied at this point
            if let Err(revert) = self.store.reopen_session(&session.id).await {
                tracing::warn!(session_id = %session.id, error = %revert, "Failed to reopen session after payment insert failed");
            }
            return Err(e.into());
        }

        let released = self
            .store
            .transition_listing_status(
                &listing.id,
                &[ListingStatus::Occupied],
                ListingStatus::Available,
            )
            .await?;
        if !released {
            tracing::warn!(listing_id = %listing.id, "Slot was not occupied at check-out");
        }

        if let Some(booking_id) = &session.booking_id {
            let closed = self
                .store
                .transition_booking_status(
                    booking_id,
                    &[BookingStatus::Active],
                    BookingStatus::Completed,
                )
                .await?;
            if !closed {
                tracing::warn!(booking_id = %booking_id, "Booking was not active at check-out");
            }
        }

        let mut session = session;
        session.status = SessionStatus::Completed.as_str().to_string();
        session.check_out_time = Some(check_out_time);
        session.duration_minutes = Some(duration_minutes);
        session.total_amount = Some(total_amount);

        metrics::record_check_out();
        tracing::info!(
            session_id = %session.id,
            duration_minutes,
            total_amount,
            "Session completed"
        );
        Ok(CheckoutSummary { session, payment })
    }

    /// Cancel a booking that has not been redeemed yet and free the
    /// slot it was holding.
    pub async fn cancel_booking(
        &self,
        booking_id: &str,
        user_id: &str,
    ) -> Result<Booking, LifecycleError> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or(LifecycleError::NotFound("Booking"))?;

        if booking.user_id != user_id {
            return Err(LifecycleError::Unauthorized("Booking"));
        }

        let cancelled = self
            .store
            .transition_booking_status(
                booking_id,
                &[BookingStatus::Pending, BookingStatus::Confirmed],
                BookingStatus::Cancelled,
            )
            .await?;
        if !cancelled {
            return Err(LifecycleError::InvalidBooking(
                "Booking can no longer be cancelled",
            ));
        }

        let released = self
            .store
            .transition_listing_status(
                &booking.listing_id,
                &[ListingStatus::Reserved],
                ListingStatus::Available,
            )
            .await?;
        if !released {
            tracing::warn!(listing_id = %booking.listing_id, "Slot was not reserved at cancel");
        }

        metrics::record_booking_cancelled();
        tracing::info!(booking_id = %booking.id, user_id = %user_id, "Booking cancelled");

        let mut booking = booking;
        booking.status = BookingStatus::Cancelled.as_str().to_string();
        Ok(booking)
    }

    /// Record a star rating and recompute the listing's mean over the
    /// full review set.
    pub async fn submit_review(
        &self,
        listing_id: &str,
        req: &CreateReviewRequest,
    ) -> Result<ReviewOutcome, LifecycleError> {
        if !(RATING_MIN..=RATING_MAX).contains(&req.rating) {
            return Err(LifecycleError::ValidationFailed(format!(
                "rating must be between {RATING_MIN} and {RATING_MAX}"
            )));
        }

        let listing = self
            .store
            .find_listing(listing_id)
            .await?
            .ok_or(LifecycleError::NotFound("Listing"))?;

        let review = Review {
            id: Uuid::new_v4().to_string(),
            listing_id: listing.id.clone(),
            user_id: req.user_id.clone(),
            rating: req.rating,
            comment: req.comment.clone(),
            created_at: Utc::now(),
        };
        self.store.create_review(&review).await?;

        let scores = self.store.list_review_scores(&listing.id).await?;
        // The review just written is part of the set, so this cannot
        // divide by zero
        let listing_rating = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
        self.store
            .update_listing_rating(&listing.id, listing_rating)
            .await?;

        tracing::info!(
            listing_id = %listing.id,
            rating = req.rating,
            listing_rating,
            "Review recorded"
        );
        Ok(ReviewOutcome {
            review,
            listing_rating,
        })
    }

    /// Best-effort return of a booking claim taken during a check-in
    /// that could not finish.
    async fn release_booking_claim(&self, booking_id: &str) {
        if let Err(e) = self
            .store
            .transition_booking_status(
                booking_id,
                &[BookingStatus::Active],
                BookingStatus::Confirmed,
            )
            .await
        {
            tracing::warn!(booking_id = %booking_id, error = %e, "Failed to release booking claim");
        }
    }

    async fn release_slot_after_failed_check_in(&self, listing: &Listing, booking_id: Option<&str>) {
        // A booked slot goes back to reserved, a walk-up slot to available
        let restore_to = match booking_id {
            Some(_) => ListingStatus::Reserved,
            None => ListingStatus::Available,
        };
        if let Err(e) = self
            .store
            .transition_listing_status(&listing.id, &[ListingStatus::Occupied], restore_to)
            .await
        {
            tracing::warn!(listing_id = %listing.id, error = %e, "Failed to release slot after check-in failed");
        }
        if let Some(booking_id) = booking_id {
            self.release_booking_claim(booking_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SigningConfig;
    use crate::db::{Host, SlotType};
    use crate::store::memory::MemoryStore;
    use chrono::Duration;

    fn setup() -> (SessionLifecycle, Arc<MemoryStore>, SlotTokenCodec) {
        let store = Arc::new(MemoryStore::new());
        let codec = SlotTokenCodec::new(&SigningConfig {
            secret: "test-secret".to_string(),
        });
        let lifecycle = SessionLifecycle::new(store.clone(), codec.clone());
        (lifecycle, store, codec)
    }

    async fn seed_listing(store: &MemoryStore, id: &str, status: ListingStatus, active: bool) {
        store
            .create_host(&Host {
                id: format!("host-of-{id}"),
                name: "Host".to_string(),
                is_active: 1,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        store
            .create_listing(&Listing {
                id: id.to_string(),
                host_id: format!("host-of-{id}"),
                address: "123 Kalayaan Avenue, Makati".to_string(),
                description: "Covered slot beside the lobby".to_string(),
                latitude: 14.5995,
                longitude: 120.9842,
                hourly_price: 50.0,
                photos: "[]".to_string(),
                amenities: "[]".to_string(),
                slot_type: SlotType::RoadsideQr.as_str().to_string(),
                status: status.as_str().to_string(),
                is_active: active as i32,
                rating: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn booking_request(listing_id: &str, user_id: &str, hours: i64) -> CreateBookingRequest {
        let start = Utc::now() + Duration::hours(1);
        CreateBookingRequest {
            listing_id: listing_id.to_string(),
            user_id: user_id.to_string(),
            start_time: start,
            end_time: start + Duration::hours(hours),
        }
    }

    async fn listing_status(store: &MemoryStore, id: &str) -> ListingStatus {
        store
            .find_listing(id)
            .await
            .unwrap()
            .unwrap()
            .status_enum()
    }

    #[tokio::test]
    async fn test_create_booking_reserves_slot() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();

        assert_eq!(booking.status_enum(), BookingStatus::Confirmed);
        assert_eq!(booking.price, 100.0);
        assert_eq!(booking.platform_fee, 5.0);
        assert_eq!(booking.host_earnings, 95.0);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Reserved);
    }

    #[tokio::test]
    async fn test_create_booking_rejects_missing_listing() {
        let (lifecycle, _, _) = setup();
        let err = lifecycle
            .create_booking(&booking_request("ghost", "driver-1", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_booking_rejects_unpublished_listing() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, false).await;

        let err = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::SlotUnavailable));
    }

    #[tokio::test]
    async fn test_create_booking_rejects_inverted_window() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let mut req = booking_request("slot-1", "driver-1", 2);
        std::mem::swap(&mut req.start_time, &mut req.end_time);
        let err = lifecycle.create_booking(&req).await.unwrap_err();
        assert!(matches!(err, LifecycleError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_create_booking_rejects_reserved_slot() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Reserved, true).await;

        let err = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::SlotUnavailable));
    }

    #[tokio::test]
    async fn test_concurrent_bookings_single_winner() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let a = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move {
                lifecycle
                    .create_booking(&booking_request("slot-1", "driver-a", 2))
                    .await
            }
        });
        let b = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move {
                lifecycle
                    .create_booking(&booking_request("slot-1", "driver-b", 2))
                    .await
            }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(LifecycleError::SlotUnavailable)))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Reserved);
    }

    #[tokio::test]
    async fn test_walk_up_check_in() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let session = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: None,
            })
            .await
            .unwrap();

        assert_eq!(session.status_enum(), SessionStatus::Active);
        assert_eq!(session.session_type_enum(), SessionType::Roadside);
        assert_eq!(session.booking_id, None);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Occupied);
    }

    #[tokio::test]
    async fn test_check_in_redeems_booking() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();

        let session = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: Some(booking.id.clone()),
            })
            .await
            .unwrap();

        assert_eq!(session.session_type_enum(), SessionType::Booked);
        assert_eq!(session.booking_id.as_deref(), Some(booking.id.as_str()));
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Occupied);
        let booking = store.find_booking(&booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status_enum(), BookingStatus::Active);
    }

    #[tokio::test]
    async fn test_check_in_rejects_malformed_token() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let err = lifecycle
            .check_in(&CheckInRequest {
                token: "not-a-token".to_string(),
                user_id: "driver-1".to_string(),
                booking_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Token(TokenError::BadFormat)));
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Available);
    }

    #[tokio::test]
    async fn test_check_in_rejects_forged_token() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let forged = SlotTokenCodec::new(&SigningConfig {
            secret: "other-secret".to_string(),
        })
        .issue("slot-1");
        let err = lifecycle
            .check_in(&CheckInRequest {
                token: forged,
                user_id: "driver-1".to_string(),
                booking_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Token(TokenError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn test_check_in_rejects_occupied_slot() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Occupied, true).await;

        let err = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::SlotUnavailable));
    }

    #[tokio::test]
    async fn test_check_in_rejects_unknown_slot() {
        let (lifecycle, _, codec) = setup();

        let err = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("ghost"),
                user_id: "driver-1".to_string(),
                booking_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_check_in_rejects_foreign_booking() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();

        let err = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-2".to_string(),
                booking_id: Some(booking.id.clone()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidBooking(_)));
        // The booking claim must not have been taken
        let booking = store.find_booking(&booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status_enum(), BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_check_in_rejects_booking_for_other_slot() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        seed_listing(&store, "slot-2", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();

        let err = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-2"),
                user_id: "driver-1".to_string(),
                booking_id: Some(booking.id),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidBooking(_)));
    }

    #[tokio::test]
    async fn test_check_in_rejects_cancelled_booking() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();
        lifecycle
            .cancel_booking(&booking.id, "driver-1")
            .await
            .unwrap();

        let err = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: Some(booking.id),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidBooking(_)));
    }

    #[tokio::test]
    async fn test_concurrent_check_ins_single_winner() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let a = tokio::spawn({
            let lifecycle = lifecycle.clone();
            let token = codec.issue("slot-1");
            async move {
                lifecycle
                    .check_in(&CheckInRequest {
                        token,
                        user_id: "driver-a".to_string(),
                        booking_id: None,
                    })
                    .await
            }
        });
        let b = tokio::spawn({
            let lifecycle = lifecycle.clone();
            let token = codec.issue("slot-1");
            async move {
                lifecycle
                    .check_in(&CheckInRequest {
                        token,
                        user_id: "driver-b".to_string(),
                        booking_id: None,
                    })
                    .await
            }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(LifecycleError::SlotUnavailable)))
                .count(),
            1
        );
    }

    async fn seed_active_session(
        store: &MemoryStore,
        session_id: &str,
        listing_id: &str,
        user_id: &str,
        minutes_ago: i64,
        booking_id: Option<String>,
    ) {
        store
            .create_session(&ParkingSession {
                id: session_id.to_string(),
                listing_id: listing_id.to_string(),
                user_id: user_id.to_string(),
                booking_id,
                session_type: SessionType::Roadside.as_str().to_string(),
                check_in_time: Utc::now() - Duration::minutes(minutes_ago),
                check_out_time: None,
                duration_minutes: None,
                total_amount: None,
                status: SessionStatus::Active.as_str().to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_check_out_bills_started_hours() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Occupied, true).await;
        seed_active_session(&store, "sess-1", "slot-1", "driver-1", 150, None).await;

        let summary = lifecycle.check_out("sess-1", "driver-1").await.unwrap();

        // 150 minutes parked bills 3 started hours at 50/hour
        let minutes = summary.session.duration_minutes.unwrap();
        assert!((150..=151).contains(&minutes), "got {minutes}");
        assert_eq!(summary.session.total_amount, Some(150.0));
        assert_eq!(summary.session.status_enum(), SessionStatus::Completed);
        assert_eq!(summary.payment.amount, 150.0);
        assert_eq!(summary.payment.platform_fee, 7.5);
        assert_eq!(summary.payment.host_earnings, 142.5);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Available);
        assert_eq!(store.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_check_out_minimum_one_hour() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Occupied, true).await;
        seed_active_session(&store, "sess-1", "slot-1", "driver-1", 0, None).await;

        let summary = lifecycle.check_out("sess-1", "driver-1").await.unwrap();
        assert_eq!(summary.session.total_amount, Some(50.0));
    }

    #[tokio::test]
    async fn test_check_out_rejects_wrong_user() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Occupied, true).await;
        seed_active_session(&store, "sess-1", "slot-1", "driver-1", 30, None).await;

        let err = lifecycle.check_out("sess-1", "driver-2").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
        // Session untouched
        let session = store.find_session("sess-1").await.unwrap().unwrap();
        assert_eq!(session.status_enum(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_check_out_rejects_missing_session() {
        let (lifecycle, _, _) = setup();
        let err = lifecycle.check_out("ghost", "driver-1").await.unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_double_check_out_single_payment() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Occupied, true).await;
        seed_active_session(&store, "sess-1", "slot-1", "driver-1", 90, None).await;

        let a = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.check_out("sess-1", "driver-1").await }
        });
        let b = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.check_out("sess-1", "driver-1").await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(LifecycleError::SessionNotActive)))
                .count(),
            1
        );
        // The losing check-out must not have written a second ledger row
        assert_eq!(store.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_check_out_survives_payment_insert_failure() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Occupied, true).await;
        seed_active_session(&store, "sess-1", "slot-1", "driver-1", 90, None).await;
        store.fail_next_payment_insert();

        let err = lifecycle.check_out("sess-1", "driver-1").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Store(_)));

        // Nothing settled: session reopened, slot still held, no ledger row
        let session = store.find_session("sess-1").await.unwrap().unwrap();
        assert_eq!(session.status_enum(), SessionStatus::Active);
        assert_eq!(session.check_out_time, None);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Occupied);
        assert!(store.payments().is_empty());

        // A retry completes normally
        let summary = lifecycle.check_out("sess-1", "driver-1").await.unwrap();
        assert_eq!(summary.session.status_enum(), SessionStatus::Completed);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Available);
        assert_eq!(store.payments().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_listing_refused_while_occupied() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let session = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: None,
            })
            .await
            .unwrap();

        // The occupied slot cannot be deleted out from under its session
        assert!(!store.delete_listing("slot-1").await.unwrap());
        lifecycle.check_out(&session.id, "driver-1").await.unwrap();
        assert_eq!(store.payments().len(), 1);

        // Once the slot is free again the delete goes through
        assert!(store.delete_listing("slot-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_check_out_closes_redeemed_booking() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();
        let session = lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: Some(booking.id.clone()),
            })
            .await
            .unwrap();

        let summary = lifecycle.check_out(&session.id, "driver-1").await.unwrap();

        assert_eq!(summary.payment.booking_id.as_deref(), Some(booking.id.as_str()));
        let booking = store.find_booking(&booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status_enum(), BookingStatus::Completed);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Available);
    }

    #[tokio::test]
    async fn test_cancel_booking_frees_slot() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();

        let cancelled = lifecycle
            .cancel_booking(&booking.id, "driver-1")
            .await
            .unwrap();

        assert_eq!(cancelled.status_enum(), BookingStatus::Cancelled);
        assert_eq!(listing_status(&store, "slot-1").await, ListingStatus::Available);
    }

    #[tokio::test]
    async fn test_cancel_booking_rejects_wrong_user() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();

        let err = lifecycle
            .cancel_booking(&booking.id, "driver-2")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_cancel_booking_rejects_redeemed_booking() {
        let (lifecycle, store, codec) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;
        let booking = lifecycle
            .create_booking(&booking_request("slot-1", "driver-1", 2))
            .await
            .unwrap();
        lifecycle
            .check_in(&CheckInRequest {
                token: codec.issue("slot-1"),
                user_id: "driver-1".to_string(),
                booking_id: Some(booking.id.clone()),
            })
            .await
            .unwrap();

        let err = lifecycle
            .cancel_booking(&booking.id, "driver-1")
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidBooking(_)));
    }

    #[tokio::test]
    async fn test_submit_review_recomputes_mean() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        let first = lifecycle
            .submit_review(
                "slot-1",
                &CreateReviewRequest {
                    user_id: "driver-1".to_string(),
                    rating: 5,
                    comment: Some("Easy access".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(first.listing_rating, 5.0);

        let second = lifecycle
            .submit_review(
                "slot-1",
                &CreateReviewRequest {
                    user_id: "driver-2".to_string(),
                    rating: 4,
                    comment: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.listing_rating, 4.5);

        let listing = store.find_listing("slot-1").await.unwrap().unwrap();
        assert_eq!(listing.rating, Some(4.5));
    }

    #[tokio::test]
    async fn test_submit_review_rejects_out_of_range_rating() {
        let (lifecycle, store, _) = setup();
        seed_listing(&store, "slot-1", ListingStatus::Available, true).await;

        for rating in [0, 6, -1] {
            let err = lifecycle
                .submit_review(
                    "slot-1",
                    &CreateReviewRequest {
                        user_id: "driver-1".to_string(),
                        rating,
                        comment: None,
                    },
                )
                .await
                .unwrap_err();
            assert!(matches!(err, LifecycleError::ValidationFailed(_)));
        }
    }

    #[tokio::test]
    async fn test_submit_review_rejects_missing_listing() {
        let (lifecycle, _, _) = setup();
        let err = lifecycle
            .submit_review(
                "ghost",
                &CreateReviewRequest {
                    user_id: "driver-1".to_string(),
                    rating: 4,
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::NotFound(_)));
    }
}
