//! Core types, configuration, and utilities shared by the stampede broker
//! and subscriber processes.

mod config;
mod error;
mod logging;
mod message;
mod paths;

pub use config::{
    BrokerConfig, Config, SubscriberConfig, DEFAULT_BROKER_ADDR, DEFAULT_BROKER_URL,
    DEFAULT_LOG_LEVEL,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use message::{random_batch_size, Message, MessageId, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
pub use paths::Paths;
