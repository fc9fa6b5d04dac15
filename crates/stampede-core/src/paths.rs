//! File system paths for broker and subscriber runtime files.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Fallback store filename under the base directory.
const STORE_FILE_NAME: &str = "log.db";
/// Shared JSONL log filename under the logs directory.
const LOG_FILE_NAME: &str = "stampede.jsonl";

/// Resolves where stampede keeps its config, store and logs.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.stampede)
    base_dir: PathBuf,
}

impl Paths {
    /// Use `~/.stampede` as the base directory.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".stampede"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the config file path (~/.stampede/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the fallback store path (~/.stampede/log.db).
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join(STORE_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the shared JSONL log path (~/.stampede/logs/stampede.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join(LOG_FILE_NAME)
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_are_rooted_at_base_dir() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/stampede-test"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/stampede-test/config.json"));
        assert_eq!(paths.store_file(), PathBuf::from("/tmp/stampede-test/log.db"));
        assert_eq!(
            paths.log_file(),
            PathBuf::from("/tmp/stampede-test/logs/stampede.jsonl")
        );
    }

    #[test]
    fn ensure_dirs_creates_logs_dir() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));

        paths.ensure_dirs().unwrap();
        assert!(paths.logs_dir().is_dir());
    }
}
