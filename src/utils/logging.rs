//! Structured logging and security-focused trace utilities.
//!
//! This module configures the `tracing` ecosystem for the application,
//! supporting multiple output formats and providing utilities to prevent
//! session credentials (bearer JWTs, `?token=` query parameters) from
//! leaking into logs.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{PortalError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static SANITIZE_ENABLED: AtomicBool = AtomicBool::new(true);

lazy_static! {
    /// Three base64url segments where the header starts with `{"` (`eyJ`).
    static ref JWT_PATTERN: Regex =
        Regex::new(r"eyJ[A-Za-z0-9_-]*\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*").unwrap();

    static ref TOKEN_PARAM_PATTERN: Regex =
        Regex::new(r"(?i)([?&](?:access_)?token=)[^&\s#]+").unwrap();
}

/// Initializes the global tracing subscriber for the application.
///
/// Supports two output formats:
/// - `json`: Structured JSON logs for production ingestion.
/// - `pretty` (default): Human-readable, colorized output for development.
///
/// Log levels are controlled via the `RUST_LOG` environment variable or
/// the provided `LoggingConfig`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    SANITIZE_ENABLED.store(config.sanitize_tokens, Ordering::Relaxed);

    // Configure filter from environment or config file
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = match config.format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    installed.map_err(|e| PortalError::Internal(format!("Failed to install logger: {}", e)))
}

/// Sanitizes session credentials from log messages.
///
/// JWT-shaped substrings become `[REDACTED_JWT]` and the value of any
/// `token=` query parameter becomes `[REDACTED]`. Returns the input
/// untouched when sanitization was disabled in [`LoggingConfig`].
pub fn sanitize(input: &str) -> String {
    if !SANITIZE_ENABLED.load(Ordering::Relaxed) {
        return input.to_string();
    }

    let without_params = TOKEN_PARAM_PATTERN.replace_all(input, "${1}[REDACTED]");
    JWT_PATTERN
        .replace_all(&without_params, "[REDACTED_JWT]")
        .into_owned()
}
