//! SQLite-backed [`ParkingStore`].
//!
//! Status transitions use conditional UPDATEs (`WHERE status IN (...)`)
//! so concurrent writers serialize on the row itself; a transition that
//! touched zero rows means another request already moved the record.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{HostProfile, NearbyFilter, ParkingStore, SessionCompletion};
use crate::db::{
    Booking, BookingStatus, DbPool, Host, Listing, ListingStatus, ParkingSession, Payment, Review,
};
use crate::engine::geo;

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParkingStore for SqliteStore {
    async fn create_listing(&self, listing: &Listing) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, host_id, address, description, latitude, longitude, hourly_price, photos, amenities, slot_type, status, is_active, rating, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&listing.id)
        .bind(&listing.host_id)
        .bind(&listing.address)
        .bind(&listing.description)
        .bind(listing.latitude)
        .bind(listing.longitude)
        .bind(listing.hourly_price)
        .bind(&listing.photos)
        .bind(&listing.amenities)
        .bind(&listing.slot_type)
        .bind(&listing.status)
        .bind(listing.is_active)
        .bind(listing.rating)
        .bind(listing.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_listing(&self, id: &str) -> Result<Option<Listing>> {
        let listing = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(listing)
    }

    async fn delete_listing(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM listings WHERE id = ? AND status = 'available'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_listings_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
        filter: &NearbyFilter,
    ) -> Result<Vec<Listing>> {
        // Bounding-box prefilter hits idx_listings_coords; the exact
        // distance check happens in Rust on the survivors
        let (dlat, dlon) = geo::degree_window(latitude, radius_km);

        let mut sql = String::from(
            "SELECT * FROM listings WHERE latitude BETWEEN ? AND ? AND longitude BETWEEN ? AND ?",
        );
        if filter.active_available_only {
            sql.push_str(" AND is_active = 1 AND status = 'available'");
        }
        if filter.exclude_listing.is_some() {
            sql.push_str(" AND id != ?");
        }

        let mut query = sqlx::query_as::<_, Listing>(&sql)
            .bind(latitude - dlat)
            .bind(latitude + dlat)
            .bind(longitude - dlon)
            .bind(longitude + dlon);
        if let Some(exclude) = &filter.exclude_listing {
            query = query.bind(exclude);
        }

        let candidates = query.fetch_all(&self.pool).await?;
        Ok(candidates
            .into_iter()
            .filter(|l| geo::haversine_km(latitude, longitude, l.latitude, l.longitude) <= radius_km)
            .collect())
    }

    async fn transition_listing_status(
        &self,
        id: &str,
        from: &[ListingStatus],
        to: ListingStatus,
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!("UPDATE listings SET status = ? WHERE id = ? AND status IN ({placeholders})");

        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_listing_rating(&self, id: &str, rating: f64) -> Result<()> {
        sqlx::query("UPDATE listings SET rating = ? WHERE id = ?")
            .bind(rating)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_recent_listings_by_owner(
        &self,
        host_id: &str,
        window_minutes: i64,
    ) -> Result<i64> {
        let cutoff = Utc::now() - Duration::minutes(window_minutes);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM listings WHERE host_id = ? AND created_at >= ?",
        )
        .bind(host_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_host(&self, host: &Host) -> Result<()> {
        sqlx::query("INSERT INTO hosts (id, name, is_active, created_at) VALUES (?, ?, ?, ?)")
            .bind(&host.id)
            .bind(&host.name)
            .bind(host.is_active)
            .bind(host.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_host(&self, id: &str) -> Result<Option<Host>> {
        let host = sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(host)
    }

    async fn find_host_profile(&self, id: &str) -> Result<Option<HostProfile>> {
        let Some(host) = self.find_host(id).await? else {
            return Ok(None);
        };
        let listings = sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE host_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(Some(HostProfile { host, listings }))
    }

    async fn set_host_active(&self, id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE hosts SET is_active = ? WHERE id = ?")
            .bind(active as i32)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_booking(&self, booking: &Booking) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, listing_id, user_id, start_time, end_time, price, platform_fee, host_earnings, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.listing_id)
        .bind(&booking.user_id)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.price)
        .bind(booking.platform_fee)
        .bind(booking.host_earnings)
        .bind(&booking.status)
        .bind(booking.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_booking(&self, id: &str) -> Result<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn transition_booking_status(
        &self,
        id: &str,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!("UPDATE bookings SET status = ? WHERE id = ? AND status IN ({placeholders})");

        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_session(&self, session: &ParkingSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, listing_id, user_id, booking_id, session_type, check_in_time, check_out_time, duration_minutes, total_amount, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.listing_id)
        .bind(&session.user_id)
        .bind(&session.booking_id)
        .bind(&session.session_type)
        .bind(session.check_in_time)
        .bind(session.check_out_time)
        .bind(session.duration_minutes)
        .bind(session.total_amount)
        .bind(&session.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session(&self, id: &str) -> Result<Option<ParkingSession>> {
        let session = sqlx::query_as::<_, ParkingSession>("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn complete_session(&self, completion: &SessionCompletion) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'completed', check_out_time = ?, duration_minutes = ?, total_amount = ?
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(completion.check_out_time)
        .bind(completion.duration_minutes)
        .bind(completion.total_amount)
        .bind(&completion.session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reopen_session(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'active', check_out_time = NULL, duration_minutes = NULL, total_amount = NULL
            WHERE id = ? AND status = 'completed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, session_id, booking_id, amount, platform_fee, host_earnings, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.session_id)
        .bind(&payment.booking_id)
        .bind(payment.amount)
        .bind(payment.platform_fee)
        .bind(payment.host_earnings)
        .bind(&payment.status)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, listing_id, user_id, rating, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review.id)
        .bind(&review.listing_id)
        .bind(&review.user_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_review_scores(&self, listing_id: &str) -> Result<Vec<i64>> {
        let scores: Vec<i64> = sqlx::query_scalar("SELECT rating FROM reviews WHERE listing_id = ?")
            .bind(listing_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(scores)
    }
}
