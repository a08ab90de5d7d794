//! Structured logging for hpcmail.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for automation
//!
//! stdout is reserved for command payloads (plans, encoded snapshots); all
//! log output goes to stderr. This matters most in agent mode, where stdout
//! carries the binary snapshot frame.

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crate targets the default filter enables.
const LOG_TARGETS: [&str; 3] = ["hm_core", "hm_common", "hpcmail"];

/// Initialize the logging subsystem.
///
/// Call once at startup before any logging occurs. A second call is a
/// no-op. `RUST_LOG` directives, when present, replace the level filter.
pub fn init_logging(config: &LogConfig) {
    let filter = if std::env::var_os("HPCMAIL_LOG").is_none() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level))
    } else {
        default_filter(config.level)
    };

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

fn default_filter(level: LogLevel) -> EnvFilter {
    let directives = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

/// Generate a unique run ID for this invocation.
pub fn generate_run_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    // Shorten to first 12 hex chars for readability
    format!("run-{}", &uuid.simple().to_string()[..12])
}
