//! Database models split into domain-specific modules.

pub mod booking;
pub mod host;
pub mod listing;
pub mod payment;
pub mod review;
pub mod session;

pub use booking::*;
pub use host::*;
pub use listing::*;
pub use payment::*;
pub use review::*;
pub use session::*;
