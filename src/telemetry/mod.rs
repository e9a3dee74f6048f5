//! Tracing initialization for embedding applications.
//!
//! The service itself only emits `tracing` events; hosts that embed it can
//! call [`init_telemetry`] to get a sensible subscriber, or install their
//! own.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetrySettings;

/// Initialize the tracing subscriber with an `EnvFilter` and either the
/// human-readable or the JSON formatter.
///
/// Safe to call more than once; subsequent calls are no-ops (useful in
/// tests where several cases initialize logging).
pub fn init_telemetry(settings: &TelemetrySettings) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if settings.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(json_logs = settings.json_logs, "Tracing initialized");
    }
}
