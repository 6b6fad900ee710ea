//! Signed slot token issuing and validation.
//!
//! Every published slot gets a QR payload of the form
//! `PARK:<slot_id>:<issued_ms>:<sig>` where `sig` is the first 8 hex
//! characters of an HMAC-SHA256 over `"<slot_id>-<issued_ms>"`. The
//! truncated tag is sized for printed QR codes; it prevents casual
//! forgery, not offline brute force, which is why check-in still
//! resolves the slot against the database afterwards.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::SigningConfig;

type HmacSha256 = Hmac<Sha256>;

/// Leading literal on every slot token
pub const TOKEN_PREFIX: &str = "PARK";

/// Tokens older than this are rejected so stale printouts age out
const TOKEN_TTL_DAYS: i64 = 30;

/// Hex characters kept from the HMAC output
const SIGNATURE_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid QR code format")]
    BadFormat,
    #[error("QR code parsing failed")]
    ParseError,
    #[error("QR code verification failed")]
    SignatureMismatch,
    #[error("QR code has expired")]
    Expired,
}

/// Fields recovered from a token that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub slot_id: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SlotTokenCodec {
    secret: String,
}

impl SlotTokenCodec {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            secret: config.secret.clone(),
        }
    }

    /// Produce a fresh signed token for a slot. Slot ids are UUIDs, so
    /// the `:` field separator cannot appear inside them.
    pub fn issue(&self, slot_id: &str) -> String {
        let issued_ms = Utc::now().timestamp_millis();
        let sig = self.signature(slot_id, issued_ms);
        format!("{TOKEN_PREFIX}:{slot_id}:{issued_ms}:{sig}")
    }

    /// Check structure, signature and age, in that order. The signature
    /// comparison is constant-time so mismatches don't leak how much of
    /// a guess was right.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let parts: Vec<&str> = token.split(':').collect();
        if parts.len() != 4 || parts[0] != TOKEN_PREFIX {
            return Err(TokenError::BadFormat);
        }

        let slot_id = parts[1];
        let issued_ms: i64 = parts[2].parse().map_err(|_| TokenError::ParseError)?;

        let expected = self.signature(slot_id, issued_ms);
        let provided = parts[3];
        if provided.len() != expected.len()
            || !bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
        {
            return Err(TokenError::SignatureMismatch);
        }

        let issued_at = Utc
            .timestamp_millis_opt(issued_ms)
            .single()
            .ok_or(TokenError::ParseError)?;
        if Utc::now() - issued_at > Duration::days(TOKEN_TTL_DAYS) {
            return Err(TokenError::Expired);
        }

        Ok(TokenClaims {
            slot_id: slot_id.to_string(),
            issued_at,
        })
    }

    fn signature(&self, slot_id: &str, issued_ms: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take a key of any size");
        mac.update(format!("{slot_id}-{issued_ms}").as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        digest[..SIGNATURE_LEN].to_string()
    }
}
