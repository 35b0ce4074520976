//! `MedInsight` Core Library
//!
//! Shared functionality for `MedInsight` components:
//! - Configuration resolution and hierarchy
//! - Wall-clock abstraction for deadline checks
//! - `SQLite` pool helpers and the shared `DatabaseError`
//! - Tracing initialisation and optional OTLP metrics

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tracing_init;

pub use clock::{Clock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
