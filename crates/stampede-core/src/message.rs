//! The message exchanged between broker and subscribers.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identifier of a [`Message`]; unique for the broker's lifetime.
pub type MessageId = String;

/// Smallest batch size a subscriber picks when none is configured.
pub const MIN_BATCH_SIZE: usize = 2;

/// Largest batch size a subscriber picks when none is configured.
pub const MAX_BATCH_SIZE: usize = 10;

/// Upper bound (inclusive) of generated periods, in milliseconds.
const MAX_GENERATED_PERIOD_MS: u64 = 1000;

/// A unit of work. Immutable once created.
///
/// On the wire this is `{"Id": "...", "Period": 123}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "Id")]
    pub id: MessageId,
    /// Simulated processing time in milliseconds.
    #[serde(rename = "Period")]
    pub period: u64,
}

impl Message {
    pub fn new(id: impl Into<MessageId>, period: u64) -> Self {
        Self {
            id: id.into(),
            period,
        }
    }

    /// Create a message with a fresh ULID and a period in `[1, 1000]` ms.
    pub fn generate() -> Self {
        let period = rand::thread_rng().gen_range(1..=MAX_GENERATED_PERIOD_MS);
        Self::new(ulid::Ulid::new().to_string(), period)
    }

    /// Encode to the JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Decode from the JSON wire form.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Pick a subscriber batch size uniformly in `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
pub fn random_batch_size() -> usize {
    rand::thread_rng().gen_range(MIN_BATCH_SIZE..=MAX_BATCH_SIZE)
}
