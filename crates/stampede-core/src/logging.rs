//! Logging initialization for broker and subscriber processes.

use std::path::PathBuf;

/// Initialize logging for one stampede process.
///
/// Logs go to stderr; when `log_file` is set every event is also appended to
/// that file as JSONL, tagged with `service`.
pub fn init_logging(service: &str, level: &str, log_file: Option<PathBuf>) {
    observability::init_with_config(observability::LogConfig {
        service_name: service.into(),
        default_level: level.into(),
        log_path: log_file,
        also_stderr: true,
    });
}
