//! `OpenTelemetry` metrics for the authentication and authorization engines.
//!
//! This module is only compiled when the `metrics` Cargo feature is enabled.
//! [`init_metrics`] installs the OTLP exporters; [`AuthMetrics`] holds the
//! counters the engines record into.

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

/// Errors that can occur during metrics / tracing pipeline initialisation.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("OpenTelemetry SDK error: {0}")]
    Sdk(#[from] opentelemetry_sdk::error::OTelSdkError),
}

/// Keeps the providers alive; call [`MetricsGuard::shutdown`] before exit
/// to flush buffered telemetry.
pub struct MetricsGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl MetricsGuard {
    pub fn shutdown(self) -> Result<(), MetricsError> {
        self.tracer_provider.shutdown()?;
        self.meter_provider.shutdown()?;
        Ok(())
    }
}

/// Initialise the OTLP pipeline for traces and metrics.
///
/// `endpoint` is the OTLP gRPC receiver, e.g. `"http://localhost:4317"`.
pub fn init_metrics(endpoint: &str) -> Result<MetricsGuard, MetricsError> {
    let trace_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(trace_exporter)
        .build();
    global::set_tracer_provider(tracer_provider.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let meter_provider = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .build();
    global::set_meter_provider(meter_provider.clone());

    Ok(MetricsGuard {
        tracer_provider,
        meter_provider,
    })
}

/// Counters for OTP and access-grant outcomes.
///
/// Built from the global meter, so recording is a no-op until
/// [`init_metrics`] has installed a provider.
#[derive(Clone)]
pub struct AuthMetrics {
    otp_issued: Counter<u64>,
    otp_verifications: Counter<u64>,
    grant_transitions: Counter<u64>,
    grant_redemptions: Counter<u64>,
}

impl AuthMetrics {
    pub fn new() -> Self {
        let meter = global::meter("medinsight");
        Self {
            otp_issued: meter
                .u64_counter("medinsight.otp.issued")
                .with_description("One-time codes created or regenerated")
                .build(),
            otp_verifications: meter
                .u64_counter("medinsight.otp.verifications")
                .with_description("One-time code verification attempts by outcome")
                .build(),
            grant_transitions: meter
                .u64_counter("medinsight.access.transitions")
                .with_description("Access grant state transitions")
                .build(),
            grant_redemptions: meter
                .u64_counter("medinsight.access.redemptions")
                .with_description("Access code redemptions by outcome")
                .build(),
        }
    }

    pub fn otp_issued(&self, purpose: &'static str) {
        self.otp_issued.add(1, &[KeyValue::new("purpose", purpose)]);
    }

    pub fn otp_verified(&self, purpose: &'static str, outcome: &'static str) {
        self.otp_verifications.add(
            1,
            &[
                KeyValue::new("purpose", purpose),
                KeyValue::new("outcome", outcome),
            ],
        );
    }

    pub fn grant_transition(&self, to: &'static str) {
        self.grant_transitions.add(1, &[KeyValue::new("to", to)]);
    }

    pub fn grant_redeemed(&self, granted: bool) {
        self.grant_redemptions
            .add(1, &[KeyValue::new("granted", granted)]);
    }
}

impl Default for AuthMetrics {
    fn default() -> Self {
        Self::new()
    }
}
