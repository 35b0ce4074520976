//! One-time code challenges bound to an (identity, purpose) pair.
//!
//! Codes are six zero-padded digits, live for `expiry_secs`, may be re-sent
//! once `resend_cooldown_secs` have passed, and accept at most
//! `max_attempts` guesses.

mod engine;
mod error;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "engine_tests.rs"]
mod tests;

pub use engine::{IssueOutcome, OtpEngine, StatusView, Verified};
pub use error::OtpError;
