//! Listing trust verification.
//!
//! Every listing draft runs through seven checks before it can go
//! live: photo coverage, price sanity against the neighborhood,
//! duplicate locations, listing velocity, description quality,
//! geographic validity and host reputation. Each finding carries a
//! severity; the weighted findings produce a 0-100 trust score and a
//! moderation recommendation. Checks that need storage run
//! concurrently, and a check that fails to complete is reported as a
//! high-severity finding rather than silently skipped.

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{RegionBounds, VerificationConfig};
use crate::db::ListingDraft;
use crate::store::{NearbyFilter, ParkingStore};

/// Minimum number of photos before the photo check passes
pub const MIN_PHOTOS: usize = 2;

/// Accepted hourly price band
pub const PRICE_MIN: f64 = 10.0;
pub const PRICE_MAX: f64 = 500.0;

/// Radius used to sample comparable listings for price deviation
const NEIGHBOR_RADIUS_KM: f64 = 2.0;

/// Allowed deviation from the neighborhood mean price
const PRICE_DEVIATION_RATIO: f64 = 0.5;

/// Two listings closer than this are considered the same physical slot
const DUPLICATE_RADIUS_KM: f64 = 0.05;

/// Window and threshold for the listing velocity check
const RAPID_WINDOW_MINUTES: i64 = 60;
const RAPID_LISTING_LIMIT: i64 = 5;

/// Descriptions shorter than this read as low effort
const SHORT_DESCRIPTION_LEN: usize = 20;

/// Addresses shorter than this cannot locate a slot
const MIN_ADDRESS_LEN: usize = 10;

/// Host rating average below which listings get flagged
const LOW_RATING_THRESHOLD: f64 = 2.5;

/// Phrases that mark a description as promotional spam
const SPAM_KEYWORDS: [&str; 5] = [
    "guaranteed",
    "free money",
    "click here",
    "limited time",
    "act now",
];

/// Score penalties per finding severity
const HIGH_PENALTY: u32 = 25;
const MEDIUM_PENALTY: u32 = 10;
const LOW_PENALTY: u32 = 5;

/// Score needed for hands-off approval
const AUTO_APPROVE_MIN_SCORE: u32 = 70;

/// Score below which a listing cannot pass at all
const PASS_MIN_SCORE: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Photos,
    Pricing,
    DuplicateLocation,
    ListingVelocity,
    ContentQuality,
    Geography,
    HostReputation,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photos => "photos",
            Self::Pricing => "pricing",
            Self::DuplicateLocation => "duplicate_location",
            Self::ListingVelocity => "listing_velocity",
            Self::ContentQuality => "content_quality",
            Self::Geography => "geography",
            Self::HostReputation => "host_reputation",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Photos => "Photo",
            Self::Pricing => "Pricing",
            Self::DuplicateLocation => "Duplicate location",
            Self::ListingVelocity => "Listing velocity",
            Self::ContentQuality => "Content quality",
            Self::Geography => "Geography",
            Self::HostReputation => "Host reputation",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What moderation should do with the listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Publish immediately without a moderator in the loop
    AutoApprove,
    /// A moderator must look before this can go live
    ManualReviewRequired,
    /// Queue for ordinary approval
    PendingApproval,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoApprove => "auto_approve",
            Self::ManualReviewRequired => "manual_review_required",
            Self::PendingApproval => "pending_approval",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single finding from one verification check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationIssue {
    pub severity: Severity,
    pub check: CheckKind,
    pub message: String,
}

impl VerificationIssue {
    pub fn low(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Low,
            check,
            message: message.into(),
        }
    }

    pub fn medium(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Medium,
            check,
            message: message.into(),
        }
    }

    pub fn high(check: CheckKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::High,
            check,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub score: u32,
    pub recommendation: Recommendation,
    pub issues: Vec<VerificationIssue>,
}

impl VerificationReport {
    /// Derive score, pass flag and recommendation from the collected
    /// findings. High findings always force manual review regardless
    /// of what the score works out to.
    pub fn from_issues(issues: Vec<VerificationIssue>) -> Self {
        let penalty: u32 = issues
            .iter()
            .map(|issue| match issue.severity {
                Severity::High => HIGH_PENALTY,
                Severity::Medium => MEDIUM_PENALTY,
                Severity::Low => LOW_PENALTY,
            })
            .sum();
        let score = 100u32.saturating_sub(penalty);
        let high_findings = issues
            .iter()
            .filter(|issue| issue.severity == Severity::High)
            .count();

        let recommendation = if high_findings == 0 && score >= AUTO_APPROVE_MIN_SCORE {
            Recommendation::AutoApprove
        } else if high_findings > 0 || score < PASS_MIN_SCORE {
            Recommendation::ManualReviewRequired
        } else {
            Recommendation::PendingApproval
        };

        Self {
            passed: score >= PASS_MIN_SCORE,
            score,
            recommendation,
            issues,
        }
    }

    pub fn should_auto_approve(&self) -> bool {
        self.recommendation == Recommendation::AutoApprove
    }

    pub fn severity_count(&self, severity: Severity) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == severity)
            .count()
    }
}

pub struct VerificationEngine {
    store: Arc<dyn ParkingStore>,
    region: RegionBounds,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn ParkingStore>, config: VerificationConfig) -> Self {
        Self {
            store,
            region: config.region,
        }
    }

    /// Run all seven checks against a draft. `exclude_listing` names an
    /// existing listing to leave out of comparisons when an edit is
    /// re-verified against its own stored row.
    pub async fn verify(
        &self,
        draft: &ListingDraft,
        owner_id: &str,
        exclude_listing: Option<&str>,
    ) -> VerificationReport {
        let (pricing, duplicates, velocity, reputation) = tokio::join!(
            self.check_pricing(draft, exclude_listing),
            self.check_duplicates(draft, owner_id, exclude_listing),
            self.check_velocity(owner_id),
            self.check_reputation(owner_id),
        );

        let mut issues = Vec::new();
        issues.extend(self.check_photos(draft));
        issues.extend(degrade(pricing, CheckKind::Pricing));
        issues.extend(degrade(duplicates, CheckKind::DuplicateLocation));
        issues.extend(degrade(velocity, CheckKind::ListingVelocity));
        issues.extend(self.check_content(draft));
        issues.extend(self.check_geography(draft));
        issues.extend(degrade(reputation, CheckKind::HostReputation));

        let report = VerificationReport::from_issues(issues);
        tracing::info!(
            owner_id = %owner_id,
            score = report.score,
            issues = report.issues.len(),
            recommendation = report.recommendation.as_str(),
            "Listing verification complete"
        );
        report
    }

    fn check_photos(&self, draft: &ListingDraft) -> Vec<VerificationIssue> {
        if draft.photos.len() < MIN_PHOTOS {
            return vec![VerificationIssue::high(
                CheckKind::Photos,
                format!(
                    "Listing has {} photo(s), at least {} are required",
                    draft.photos.len(),
                    MIN_PHOTOS
                ),
            )];
        }
        Vec::new()
    }

    async fn check_pricing(
        &self,
        draft: &ListingDraft,
        exclude_listing: Option<&str>,
    ) -> Result<Vec<VerificationIssue>> {
        let mut issues = Vec::new();

        if draft.hourly_price < PRICE_MIN || draft.hourly_price > PRICE_MAX {
            issues.push(VerificationIssue::medium(
                CheckKind::Pricing,
                format!(
                    "Hourly price {} is outside the accepted {}-{} range",
                    draft.hourly_price, PRICE_MIN, PRICE_MAX
                ),
            ));
        }

        let filter = NearbyFilter {
            exclude_listing: exclude_listing.map(String::from),
            active_available_only: true,
        };
        let neighbors = self
            .store
            .find_listings_near(draft.latitude, draft.longitude, NEIGHBOR_RADIUS_KM, &filter)
            .await?;
        if !neighbors.is_empty() {
            let mean: f64 =
                neighbors.iter().map(|l| l.hourly_price).sum::<f64>() / neighbors.len() as f64;
            if (draft.hourly_price - mean).abs() > PRICE_DEVIATION_RATIO * mean {
                issues.push(VerificationIssue::low(
                    CheckKind::Pricing,
                    format!(
                        "Hourly price deviates more than 50% from the {:.2} average of {} nearby listing(s)",
                        mean,
                        neighbors.len()
                    ),
                ));
            }
        }

        Ok(issues)
    }

    async fn check_duplicates(
        &self,
        draft: &ListingDraft,
        owner_id: &str,
        exclude_listing: Option<&str>,
    ) -> Result<Vec<VerificationIssue>> {
        let filter = NearbyFilter {
            exclude_listing: exclude_listing.map(String::from),
            active_available_only: false,
        };
        let nearby = self
            .store
            .find_listings_near(draft.latitude, draft.longitude, DUPLICATE_RADIUS_KM, &filter)
            .await?;

        let own: Vec<&str> = nearby
            .iter()
            .filter(|l| l.host_id == owner_id)
            .map(|l| l.id.as_str())
            .collect();
        let others: Vec<&str> = nearby
            .iter()
            .filter(|l| l.host_id != owner_id)
            .map(|l| l.id.as_str())
            .collect();

        let mut issues = Vec::new();
        if !own.is_empty() {
            issues.push(VerificationIssue::high(
                CheckKind::DuplicateLocation,
                format!(
                    "Host already has {} listing(s) within 50 m of this location: {}",
                    own.len(),
                    own.join(", ")
                ),
            ));
        }
        if !others.is_empty() {
            issues.push(VerificationIssue::high(
                CheckKind::DuplicateLocation,
                format!(
                    "Another host has {} listing(s) within 50 m of this location: {}",
                    others.len(),
                    others.join(", ")
                ),
            ));
        }
        Ok(issues)
    }

    async fn check_velocity(&self, owner_id: &str) -> Result<Vec<VerificationIssue>> {
        let recent = self
            .store
            .count_recent_listings_by_owner(owner_id, RAPID_WINDOW_MINUTES)
            .await?;
        // The draft itself counts toward the limit
        if recent + 1 >= RAPID_LISTING_LIMIT {
            return Ok(vec![VerificationIssue::high(
                CheckKind::ListingVelocity,
                format!("Host has created {recent} listing(s) in the past hour"),
            )]);
        }
        Ok(Vec::new())
    }

    fn check_content(&self, draft: &ListingDraft) -> Vec<VerificationIssue> {
        let mut issues = Vec::new();

        let trimmed = draft.description.trim();
        if trimmed.is_empty() {
            issues.push(VerificationIssue::medium(
                CheckKind::ContentQuality,
                "Description is empty",
            ));
        } else if trimmed.chars().count() < SHORT_DESCRIPTION_LEN {
            issues.push(VerificationIssue::low(
                CheckKind::ContentQuality,
                format!("Description is shorter than {SHORT_DESCRIPTION_LEN} characters"),
            ));
        }

        let lowered = draft.description.to_lowercase();
        let flagged: Vec<&str> = SPAM_KEYWORDS
            .iter()
            .copied()
            .filter(|kw| lowered.contains(kw))
            .collect();
        if !flagged.is_empty() {
            issues.push(VerificationIssue::high(
                CheckKind::ContentQuality,
                format!("Description contains flagged phrases: {}", flagged.join(", ")),
            ));
        }

        issues
    }

    fn check_geography(&self, draft: &ListingDraft) -> Vec<VerificationIssue> {
        let mut issues = Vec::new();

        let lat_valid = (-90.0..=90.0).contains(&draft.latitude);
        let lon_valid = (-180.0..=180.0).contains(&draft.longitude);
        if !lat_valid || !lon_valid {
            issues.push(VerificationIssue::high(
                CheckKind::Geography,
                format!(
                    "Coordinates {}, {} are not valid",
                    draft.latitude, draft.longitude
                ),
            ));
        } else if !self.region.contains(draft.latitude, draft.longitude) {
            // Region membership is meaningless for garbage coordinates,
            // so it is only judged once they are valid
            issues.push(VerificationIssue::medium(
                CheckKind::Geography,
                "Location is outside the supported service region",
            ));
        }

        if draft.address.trim().chars().count() < MIN_ADDRESS_LEN {
            issues.push(VerificationIssue::high(
                CheckKind::Geography,
                "Address is missing or too short",
            ));
        }

        issues
    }

    async fn check_reputation(&self, owner_id: &str) -> Result<Vec<VerificationIssue>> {
        let Some(profile) = self.store.find_host_profile(owner_id).await? else {
            return Ok(vec![VerificationIssue::high(
                CheckKind::HostReputation,
                "Host account does not exist",
            )]);
        };

        if !profile.host.active() {
            return Ok(vec![VerificationIssue::high(
                CheckKind::HostReputation,
                "Host account is deactivated",
            )]);
        }

        // Only the host's published listings count toward the average;
        // a pulled listing's rating no longer speaks for the host
        let ratings: Vec<f64> = profile
            .listings
            .iter()
            .filter(|l| l.active())
            .filter_map(|l| l.rating)
            .collect();
        if !ratings.is_empty() {
            let average = ratings.iter().sum::<f64>() / ratings.len() as f64;
            if average < LOW_RATING_THRESHOLD {
                return Ok(vec![VerificationIssue::medium(
                    CheckKind::HostReputation,
                    format!(
                        "Host rating average {average:.1} is below {LOW_RATING_THRESHOLD}"
                    ),
                )]);
            }
        }

        Ok(Vec::new())
    }
}

/// Turn a check failure into a high finding so a broken dependency can
/// never wave a listing through.
fn degrade(result: Result<Vec<VerificationIssue>>, check: CheckKind) -> Vec<VerificationIssue> {
    match result {
        Ok(issues) => issues,
        Err(e) => {
            tracing::warn!(check = %check, error = %e, "Verification check could not be completed");
            let message = format!("{} check could not be completed", check.label());
            vec![VerificationIssue::high(check, message)]
        }
    }
}
