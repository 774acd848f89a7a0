//! Logging setup for Strata.
//!
//! Strata logs through `tracing`. A subscriber is installed only when asked
//! for through the environment:
//!
//! - `STRATA_DEBUG=true|1|yes` - enable debug logging
//! - `STRATA_LOG_LEVEL=trace|debug|info|warn|error` - set the log level
//! - `STRATA_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! use strata_migrate::logging;
//!
//! logging::init();
//! ```
//!
//! Applications that install their own subscriber can skip [`init`]
//! entirely; events are emitted under the `strata_migrate` and
//! `strata_sqlite` targets.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if `STRATA_DEBUG` is set to "true", "1" or "yes".
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("STRATA_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Log level from `STRATA_LOG_LEVEL`.
///
/// Defaults to "debug" when `STRATA_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("STRATA_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Log format from `STRATA_LOG_FORMAT`. Defaults to "json".
pub fn get_log_format() -> &'static str {
    env::var("STRATA_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Install the Strata subscriber. Subsequent calls are no-ops.
///
/// Without the `tracing-subscriber` feature this does nothing.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("STRATA_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!(
                "strata={},strata_migrate={},strata_sqlite={}",
                level, level, level
            ))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

            // try_init: the host application may already own the global subscriber.
            let installed = match get_log_format() {
                "json" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json())
                    .try_init(),
                "compact" => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().compact())
                    .try_init(),
                _ => tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().pretty())
                    .try_init(),
            };

            if installed.is_ok() {
                tracing::info!(
                    level = level,
                    format = get_log_format(),
                    "Strata logging initialized"
                );
            }
        }
    });
}

/// Set `STRATA_LOG_LEVEL` and call [`init`].
///
/// # Safety
///
/// Modifies the process environment. Call this at startup before spawning
/// threads.
pub fn init_with_level(level: &str) {
    // SAFETY: documented to be called at program startup before threads are spawned.
    unsafe {
        env::set_var("STRATA_LOG_LEVEL", level);
    }
    init();
}
