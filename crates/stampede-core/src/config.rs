//! Configuration for the broker and subscriber processes.
//!
//! Values come from `<base_dir>/config.json` when present, otherwise from
//! defaults. `STAMPEDE_LOG_LEVEL` and `STAMPEDE_BROKER_URL` override the file,
//! and the binaries' command-line flags override both.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default listen address of the broker.
pub const DEFAULT_BROKER_ADDR: &str = "0.0.0.0:8080";

/// Default broker URL used by subscribers.
pub const DEFAULT_BROKER_URL: &str = "http://localhost:8080";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Also append JSONL logs to `<base_dir>/logs/stampede.jsonl`.
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub subscriber: SubscriberConfig,
}

/// Broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Address the HTTP surface binds to.
    pub listen_addr: String,
    /// Interval between generated messages.
    pub produce_interval_ms: u64,
    /// Wait applied while no subscriber is connected.
    pub backoff_ms: u64,
    /// Wait between two delivery attempts of the same message.
    pub retry_interval_ms: u64,
    /// Delivery attempts per message before it is archived or abandoned.
    pub max_attempts: u32,
    /// Archive messages that exhausted their attempts without ever being
    /// dispatched. Off by default: only dispatched messages are archived.
    pub archive_undispatched: bool,
}

impl BrokerConfig {
    pub fn produce_interval(&self) -> Duration {
        Duration::from_millis(self.produce_interval_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_BROKER_ADDR.to_string(),
            produce_interval_ms: 1_000,
            backoff_ms: 3_000,
            retry_interval_ms: 400,
            max_attempts: 3,
            archive_undispatched: false,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Base URL of the broker.
    pub broker_url: String,
    /// Concurrency ceiling. `None` picks a random size in `[2, 10]` at startup.
    pub batch_size: Option<usize>,
    /// Keep consuming forever instead of exiting after `batch_size` tasks.
    pub persistent: bool,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            batch_size: None,
            persistent: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_to_file: false,
            broker: BrokerConfig::default(),
            subscriber: SubscriberConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the paths' config file, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the engines cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.broker.max_attempts == 0 {
            return Err(CoreError::Config(
                "broker.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.subscriber.batch_size == Some(0) {
            return Err(CoreError::Config(
                "subscriber.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("STAMPEDE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(url) = std::env::var("STAMPEDE_BROKER_URL") {
            self.subscriber.broker_url = url;
        }
    }
}
