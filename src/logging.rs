//! # Tracing Module
//!
//! Environment-aware console logging using the tracing ecosystem.
//! Designed for containerized applications where logs should go to
//! stdout/stderr: no file appenders, no log directories.
//!
//! Output format is selected at startup: human-readable with TTY-aware ANSI
//! colors by default, line-delimited JSON when `DBGUARD_LOG_FORMAT=json`.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize console logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// `RUST_LOG` takes precedence over the environment-derived default level.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let default_level = default_log_level(&environment);

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

        let use_json = std::env::var("DBGUARD_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let registry = tracing_subscriber::registry().with(filter);

        // A subscriber may already be installed by the embedding application;
        // try_init keeps that one and leaves ours uninstalled.
        let result = if use_json {
            registry
                .with(fmt::layer().with_target(true).with_ansi(false).json())
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(std::io::stdout().is_terminal()),
                )
                .try_init()
        };

        if result.is_ok() {
            tracing::debug!(environment = %environment, "Logging initialized");
        }
    });
}

fn get_environment() -> String {
    std::env::var("DBGUARD_ENV").unwrap_or_else(|_| "development".to_string())
}

fn default_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}
