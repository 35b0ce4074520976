//! Tracing/logging initialization for the server binary.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line, for structured log aggregation.
    Json,
}

impl LogFormat {
    pub const fn from_json_flag(log_json: bool) -> Self {
        if log_json { Self::Json } else { Self::Pretty }
    }
}

/// Build the env filter: `RUST_LOG` wins, then the configured level for the
/// `medinsight_*` crates, then `default_filter`.
pub fn build_filter(default_filter: &str, configured_level: Option<&str>) -> EnvFilter {
    if let Ok(from_env) = std::env::var("RUST_LOG") {
        return EnvFilter::new(from_env);
    }
    match configured_level {
        Some(level) => EnvFilter::new(format!(
            "medinsight_server={level},medinsight_core={level},medinsight_crypto={level}"
        )),
        None => EnvFilter::new(default_filter),
    }
}

/// Initialise the global tracing subscriber.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(filter: EnvFilter, format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .is_ok(),
    }
}
