//! SQLite storage for the `MedInsight` server.
//!
//! Provides persistence for staff users, patients, encrypted medical records,
//! one-time code challenges, access grants and revoked bearer tokens.

mod db;
mod models;
mod queries_grants;
mod queries_otp;
mod queries_records;
mod queries_users;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests;

pub use db::{DatabaseError, MedDatabase};
pub use models::*;
pub use queries_otp::ChallengeWindow;
pub(crate) use queries_users::normalize_email;
