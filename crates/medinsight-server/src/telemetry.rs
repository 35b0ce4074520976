//! Engine counters.
//!
//! Forwards to `medinsight_core::metrics::AuthMetrics` when the `metrics`
//! feature is enabled, otherwise every call compiles to nothing.

use crate::storage::{GrantStatus, OtpPurpose};

#[cfg(feature = "metrics")]
fn metrics() -> &'static medinsight_core::metrics::AuthMetrics {
    static METRICS: std::sync::OnceLock<medinsight_core::metrics::AuthMetrics> =
        std::sync::OnceLock::new();
    METRICS.get_or_init(medinsight_core::metrics::AuthMetrics::new)
}

pub fn otp_issued(purpose: OtpPurpose) {
    #[cfg(feature = "metrics")]
    metrics().otp_issued(purpose.as_str());
    #[cfg(not(feature = "metrics"))]
    let _ = purpose;
}

pub fn otp_verified(purpose: OtpPurpose, outcome: &'static str) {
    #[cfg(feature = "metrics")]
    metrics().otp_verified(purpose.as_str(), outcome);
    #[cfg(not(feature = "metrics"))]
    let _ = (purpose, outcome);
}

pub fn grant_transition(to: GrantStatus) {
    #[cfg(feature = "metrics")]
    metrics().grant_transition(to.as_str());
    #[cfg(not(feature = "metrics"))]
    let _ = to;
}

pub fn grant_redeemed(granted: bool) {
    #[cfg(feature = "metrics")]
    metrics().grant_redeemed(granted);
    #[cfg(not(feature = "metrics"))]
    let _ = granted;
}
