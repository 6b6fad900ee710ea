//! Parking session models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for SessionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "active" => Self::Active,
            "completed" => Self::Completed,
            _ => Self::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    /// Walk-up stay started by scanning the slot QR with no reservation
    Roadside,
    /// Stay that redeems an advance booking
    Booked,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Roadside => "roadside",
            Self::Booked => "booked",
        }
    }
}

impl std::fmt::Display for SessionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for SessionType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "roadside" => Self::Roadside,
            "booked" => Self::Booked,
            _ => Self::Roadside,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParkingSession {
    pub id: String,
    pub listing_id: String,
    pub user_id: String,
    pub booking_id: Option<String>,
    pub session_type: String,
    pub check_in_time: DateTime<Utc>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub total_amount: Option<f64>,
    pub status: String,
}

impl ParkingSession {
    pub fn status_enum(&self) -> SessionStatus {
        SessionStatus::from(self.status.clone())
    }

    pub fn session_type_enum(&self) -> SessionType {
        SessionType::from(self.session_type.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckInRequest {
    /// Raw payload scanned from the slot QR code
    pub token: String,
    pub user_id: String,
    /// Booking to redeem; omitted for walk-up sessions
    #[serde(default)]
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckOutRequest {
    pub user_id: String,
}
