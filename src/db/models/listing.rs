//! Listing models and DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    Reserved,
    Occupied,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Occupied => "occupied",
        }
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for ListingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "available" => Self::Available,
            "reserved" => Self::Reserved,
            "occupied" => Self::Occupied,
            _ => Self::Available,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    /// Street-side slot unlocked by scanning a printed QR code
    RoadsideQr,
    /// Staffed lot where an attendant checks vehicles in
    CommercialManual,
    /// Gated lot with barrier hardware driving check-in
    CommercialIot,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoadsideQr => "roadside_qr",
            Self::CommercialManual => "commercial_manual",
            Self::CommercialIot => "commercial_iot",
        }
    }
}

impl std::fmt::Display for SlotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for SlotType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "roadside_qr" => Self::RoadsideQr,
            "commercial_manual" => Self::CommercialManual,
            "commercial_iot" => Self::CommercialIot,
            _ => Self::RoadsideQr,
        }
    }
}

impl Default for SlotType {
    fn default() -> Self {
        Self::RoadsideQr
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Listing {
    pub id: String,
    pub host_id: String,
    pub address: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub hourly_price: f64,
    /// JSON array of photo URLs
    pub photos: String,
    /// JSON array of amenity strings
    pub amenities: String,
    pub slot_type: String,
    pub status: String,
    /// Whether the listing is published and bookable (0 until approved)
    pub is_active: i32,
    /// Mean review rating, null until the first review lands
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(host_id: &str, draft: &ListingDraft, amenities: &[String], published: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            host_id: host_id.to_string(),
            address: draft.address.clone(),
            description: draft.description.clone(),
            latitude: draft.latitude,
            longitude: draft.longitude,
            hourly_price: draft.hourly_price,
            photos: serde_json::to_string(&draft.photos).unwrap_or_else(|_| "[]".to_string()),
            amenities: serde_json::to_string(amenities).unwrap_or_else(|_| "[]".to_string()),
            slot_type: draft.slot_type.as_str().to_string(),
            status: ListingStatus::Available.as_str().to_string(),
            is_active: published as i32,
            rating: None,
            created_at: Utc::now(),
        }
    }

    pub fn status_enum(&self) -> ListingStatus {
        ListingStatus::from(self.status.clone())
    }

    pub fn slot_type_enum(&self) -> SlotType {
        SlotType::from(self.slot_type.clone())
    }

    pub fn active(&self) -> bool {
        self.is_active != 0
    }

    pub fn get_photos(&self) -> Vec<String> {
        serde_json::from_str(&self.photos).unwrap_or_default()
    }

    pub fn get_amenities(&self) -> Vec<String> {
        serde_json::from_str(&self.amenities).unwrap_or_default()
    }
}

/// The listing fields that go through trust verification, either as a
/// dry run or as part of creating the listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    pub address: String,
    #[serde(default)]
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub hourly_price: f64,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub slot_type: SlotType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateListingRequest {
    pub host_id: String,
    #[serde(flatten)]
    pub draft: ListingDraft,
    #[serde(default)]
    pub amenities: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyListingRequest {
    pub host_id: String,
    #[serde(flatten)]
    pub draft: ListingDraft,
    /// Existing listing to leave out of duplicate/pricing comparisons
    /// when re-verifying an edit
    #[serde(default)]
    pub exclude_listing_id: Option<String>,
}

/// Response DTO for Listing with JSON columns decoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingResponse {
    pub id: String,
    pub host_id: String,
    pub address: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub hourly_price: f64,
    pub photos: Vec<String>,
    pub amenities: Vec<String>,
    pub slot_type: SlotType,
    pub status: ListingStatus,
    pub is_active: bool,
    pub rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<Listing> for ListingResponse {
    fn from(listing: Listing) -> Self {
        Self {
            photos: listing.get_photos(),
            amenities: listing.get_amenities(),
            slot_type: listing.slot_type_enum(),
            status: listing.status_enum(),
            is_active: listing.is_active != 0,
            id: listing.id,
            host_id: listing.host_id,
            address: listing.address,
            description: listing.description,
            latitude: listing.latitude,
            longitude: listing.longitude,
            hourly_price: listing.hourly_price,
            rating: listing.rating,
            created_at: listing.created_at,
        }
    }
}
