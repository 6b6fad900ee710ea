//! Core trust and session services: listing verification, slot
//! tokens, fee math and the booking/session state machine.

pub mod fees;
pub mod geo;
pub mod lifecycle;
pub mod token;
pub mod verification;

pub use lifecycle::{CheckoutSummary, LifecycleError, ReviewOutcome, SessionLifecycle};
pub use token::{SlotTokenCodec, TokenClaims, TokenError};
pub use verification::{
    CheckKind, Recommendation, Severity, VerificationEngine, VerificationIssue, VerificationReport,
};
