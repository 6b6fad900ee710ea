//! Review models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: String,
    pub listing_id: String,
    pub user_id: String,
    /// Integer stars, 1 through 5
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReviewRequest {
    pub user_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}
