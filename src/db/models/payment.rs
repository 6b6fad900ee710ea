//! Payment ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for PaymentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "completed" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

/// Append-only settlement record written at check-out. Rows are never
/// updated in place; a later capture flow writes follow-up rows instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: String,
    pub session_id: String,
    pub booking_id: Option<String>,
    pub amount: f64,
    pub platform_fee: f64,
    pub host_earnings: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn status_enum(&self) -> PaymentStatus {
        PaymentStatus::from(self.status.clone())
    }
}
