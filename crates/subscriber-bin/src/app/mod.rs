//! Subscriber wiring: push-stream client, acknowledger and receive loop.

mod ack;
mod run;
mod sse;

pub use run::{run_subscriber, SubscriberSettings};
