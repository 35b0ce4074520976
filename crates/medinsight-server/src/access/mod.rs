//! Time-boxed, code-gated doctor access to patient records.
//!
//! A doctor requests access (`pending`), an admin approves it with a code
//! and a duration or rejects it, and the doctor redeems the code while the
//! window is open. `approved` and `rejected` are terminal; expiry is derived
//! at read time and never written back.

mod engine;
mod error;

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "engine_tests.rs"]
mod tests;

pub use engine::{AccessEngine, Approval, CodeChoice, GrantView, Notice, RecordEntry, RecordView};
pub use error::AccessError;
