//! `MedInsight` Server Library
//!
//! Core functionality for the `MedInsight` hospital records server:
//! - SQLite storage for staff, patients, encrypted records, challenges and grants
//! - One-time code challenges for login and other step-up flows
//! - Time-boxed, code-gated doctor access to patient records
//! - JWT bearer credentials and argon2 password hashing
//! - Axum HTTP API

pub mod access;
pub mod auth;
pub mod identity;
pub mod notify;
pub mod otp;
pub mod records;
pub mod server;
pub mod storage;
mod telemetry;
