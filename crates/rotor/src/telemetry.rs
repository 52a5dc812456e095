// Tracing setup
//
// Console logging through tracing-subscriber with an EnvFilter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Configuration for log output
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "rotor=debug")
    pub log_filter: Option<String>,
    /// Include the event target in each line
    pub with_target: bool,
    /// Include the executor thread name in each line
    pub with_thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            with_target: true,
            with_thread_names: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter (default: "info")
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ..Default::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

/// Install the global tracing subscriber
///
/// Returns false if a subscriber was already installed, which makes it safe
/// to call from several tests.
///
/// # Example
///
/// ```ignore
/// use rotor::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(TelemetryConfig::from_env());
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> bool {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names)
        .with_filter(config.filter());

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok()
}
