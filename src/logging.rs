//! # Structured Logging Module
//!
//! Console tracing setup for the exporter. `RUST_LOG` overrides the
//! environment-derived default filter.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console tracing. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(use_ansi)
            .with_filter(filter);

        // try_init so embedding in tests with their own subscriber is not an error
        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized");
        }
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("EXPORTER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get default log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
