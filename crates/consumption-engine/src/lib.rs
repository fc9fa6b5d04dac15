//! Subscriber-side consumption of dispatched messages.
//!
//! Every payload pushed by the broker goes through
//! [`ConsumptionEngine::on_message_received`]: it is decoded, deduplicated by
//! id and handed to its own processing task. Processing is admitted only while
//! fewer than `batch_size` tasks are active; admitted tasks simulate work for
//! the message's period and then acknowledge it through an [`Acknowledger`].

mod ack;
mod engine;
mod error;

pub use ack::Acknowledger;
pub use engine::{
    ConsumptionEngine, FatalFault, Outcome, Receipt, FATAL_PERIOD_THRESHOLD_MS,
    LOCAL_FAULT_THRESHOLD_MS,
};
pub use error::{AckError, AckResult, ConsumeError, ConsumeResult};
