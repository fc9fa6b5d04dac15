//! # Observability
//!
//! Shared `tracing` setup for the stampede broker and its subscribers.
//!
//! Processes call [`init_with_config`] once at startup and then use the
//! standard `tracing` macros. Output always goes to stderr in compact form;
//! when a log file is configured every event is additionally appended to it
//! as one JSON object per line, so a broker and a herd of subscribers can
//! share a single file:
//!
//! ```text
//! tail -f ~/.stampede/logs/stampede.jsonl | jq 'select(.service == "stampede-broker")'
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "subscriber".into(),
//!     default_level: "debug".into(),
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod dev;
mod json_layer;

use std::path::PathBuf;

pub use dev::{CentralLogWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service ("stampede-broker", "stampede-subscriber").
    /// Included in every JSON line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL file that receives a copy of every event.
    pub log_path: Option<PathBuf>,

    /// Emit compact human-readable logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize the observability layer with custom configuration.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber installed.
pub fn init_with_config(config: LogConfig) {
    dev::init_subscriber(&config);
}
