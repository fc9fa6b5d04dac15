//! # Distribution engine
//!
//! Broker-side core of the stampede protocol: every enqueued message is
//! handed to exactly one live subscriber connection, retried a bounded number
//! of times, and archived to the fallback store when it was dispatched but
//! never acknowledged.
//!
//! ```text
//! ┌──────────────┐   enqueue   ┌────────────────────┐  try_deliver  ┌────────────┐
//! │ message feed │────────────▶│ DistributionEngine │──────────────▶│ Connection │──▶ /task stream
//! └──────────────┘             └─────────┬──────────┘               └────────────┘
//!                                        │ store_message                  ▲
//!                                  ┌─────▼─────┐         report_message   │
//!                                  │ Fallback  │◀──── /report ────────────┘
//!                                  │   store   │
//!                                  └───────────┘
//! ```
//!
//! Shared state is split into three independently locked resources: the
//! [`SubscriberRegistry`], the retry/dispatch ledger, and the reported set.
//! No code path holds two of these locks at once.

mod engine;
mod error;
mod registry;

pub use engine::{DistributionConfig, DistributionEngine, Disposition, DEFAULT_QUEUE_CAPACITY};
pub use error::{DistributionError, DistributionResult};
pub use registry::{Connection, ConnectionId, Inbox, SendOutcome, SubscriberRegistry};
