//! Fee split calculation.
//!
//! Bookings and check-outs both bill whole hours: any started hour is
//! charged in full and every stay is at least one hour. The platform
//! keeps a flat cut of the gross and the host gets the remainder, so
//! the two legs always sum back to the gross amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform share of the gross price
pub const PLATFORM_FEE_RATE: f64 = 0.05;

const MILLIS_PER_MINUTE: i64 = 60_000;
const MINUTES_PER_HOUR: i64 = 60;

/// Priced breakdown of a reservation window or completed stay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub duration_hours: i64,
    pub gross_price: f64,
    pub platform_fee: f64,
    pub host_earnings: f64,
}

/// Price a reservation window at the listing's hourly rate.
pub fn split(hourly_price: f64, start: DateTime<Utc>, end: DateTime<Utc>) -> FeeSplit {
    let duration_hours = billable_hours(elapsed_minutes(start, end));
    let gross_price = hourly_price * duration_hours as f64;
    let (platform_fee, host_earnings) = split_amount(gross_price);
    FeeSplit {
        duration_hours,
        gross_price,
        platform_fee,
        host_earnings,
    }
}

/// Split a gross amount into `(platform_fee, host_earnings)`.
/// Host earnings are derived by subtraction so the legs always add
/// back up to the gross.
pub fn split_amount(gross: f64) -> (f64, f64) {
    let platform_fee = gross * PLATFORM_FEE_RATE;
    (platform_fee, gross - platform_fee)
}

/// Elapsed wall-clock minutes between two instants, rounded up.
/// Inverted or empty windows come out as zero.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    ceil_div((end - start).num_milliseconds(), MILLIS_PER_MINUTE)
}

/// Whole billable hours for a stay of the given length, with a
/// one-hour minimum.
pub fn billable_hours(duration_minutes: i64) -> i64 {
    ceil_div(duration_minutes, MINUTES_PER_HOUR).max(1)
}

fn ceil_div(n: i64, d: i64) -> i64 {
    if n <= 0 {
        0
    } else {
        (n + d - 1) / d
    }
}
