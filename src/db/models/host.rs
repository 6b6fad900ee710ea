//! Host account models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Host {
    pub id: String,
    pub name: String,
    pub is_active: i32,
    pub created_at: DateTime<Utc>,
}

impl Host {
    pub fn new(name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            is_active: 1,
            created_at: Utc::now(),
        }
    }

    pub fn active(&self) -> bool {
        self.is_active != 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateHostRequest {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateHostActiveRequest {
    pub active: bool,
}

/// Response DTO for Host with the active flag as a proper bool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostResponse {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Host> for HostResponse {
    fn from(host: Host) -> Self {
        Self {
            is_active: host.is_active != 0,
            id: host.id,
            name: host.name,
            created_at: host.created_at,
        }
    }
}
