//! Logging initialization and configuration.
//!
//! Uses the `tracing` ecosystem for structured logging with support for
//! both human-readable and JSON output formats.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// Logs go to stderr; stdout carries reports and paths. `RUST_LOG` overrides
/// the level picked here.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        // JSON format for machine parsing
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        // Pretty format for humans
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` config section. The CLI flags can
/// only raise verbosity or switch to JSON, never the reverse.
pub fn init_from_config(
    config: &imgpipe_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let json_format = json_logs_override || config.logging.format == "json";
    init(level_for(&config.logging.level, verbose_override), json_format);
}

/// The filter directive for a configured level and the `--verbose` flag.
fn level_for(configured: &str, verbose: bool) -> &'static str {
    match configured.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        _ if verbose => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}
