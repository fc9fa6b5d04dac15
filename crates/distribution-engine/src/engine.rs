//! The broker's distribution loop and its per-message bookkeeping.

use crate::{DistributionError, DistributionResult, SendOutcome, SubscriberRegistry};
use fallback_store::FallbackStore;
use parking_lot::Mutex;
use stampede_core::{BrokerConfig, Message, MessageId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default capacity of the inbound message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Retry and backoff policy of the distribution loop.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    /// Attempts per message before it is archived or abandoned.
    pub max_attempts: u32,
    /// Wait applied while no subscriber is registered.
    pub backoff: Duration,
    /// Wait between two attempts on the same message.
    pub retry_interval: Duration,
    /// Also archive messages that were never dispatched.
    pub archive_undispatched: bool,
    /// Capacity of the inbound queue.
    pub queue_capacity: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for DistributionConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.backoff(),
            retry_interval: config.retry_interval(),
            archive_undispatched: config.archive_undispatched,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Where a message ended up once the loop stopped working on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A subscriber reported it; retry state was dropped.
    Acknowledged,
    /// Dispatched but unacknowledged after the last attempt; written to the
    /// fallback store.
    Archived,
    /// No connection ever accepted it; dropped without persistence.
    Abandoned,
    /// Dispatched, but attempts ran out while waiting for subscribers before
    /// the archive threshold was reached.
    Dispatched,
}

/// Retry counts and the dispatched set. One lock guards both.
#[derive(Default)]
struct DeliveryLedger {
    retries: HashMap<MessageId, u32>,
    dispatched: HashSet<MessageId>,
}

impl DeliveryLedger {
    fn bump(&mut self, id: &str) -> u32 {
        let count = self.retries.entry(id.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

/// What a single attempt decided.
enum Step {
    /// Keep going with the next attempt.
    Continue,
    /// Dispatched and the attempt budget is spent.
    Exhausted,
    /// Reported while the attempt was being counted.
    Acknowledged,
}

/// Broker distribution engine.
///
/// # Lifecycle
///
/// 1. Create with [`DistributionEngine::new()`]
/// 2. Call [`DistributionEngine::start()`] (or await [`run()`](Self::run))
/// 3. Feed messages with [`enqueue()`](Self::enqueue)
/// 4. Forward acknowledgments to [`report_message()`](Self::report_message)
pub struct DistributionEngine {
    config: DistributionConfig,
    registry: SubscriberRegistry,
    store: Arc<dyn FallbackStore>,
    ledger: Mutex<DeliveryLedger>,
    reported: Mutex<HashSet<MessageId>>,
    sender: mpsc::Sender<Message>,
    receiver: Mutex<Option<mpsc::Receiver<Message>>>,
}

impl DistributionEngine {
    pub fn new(
        config: DistributionConfig,
        registry: SubscriberRegistry,
        store: Arc<dyn FallbackStore>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            registry,
            store,
            ledger: Mutex::new(DeliveryLedger::default()),
            reported: Mutex::new(HashSet::new()),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    /// Place a message on the inbound queue.
    pub fn enqueue(&self, msg: Message) -> DistributionResult<()> {
        if msg.id.is_empty() {
            return Err(DistributionError::EmptyMessageId);
        }

        self.sender.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(msg) => DistributionError::QueueFull(msg.id),
            mpsc::error::TrySendError::Closed(_) => DistributionError::QueueClosed,
        })
    }

    /// Spawn the distribution loop on the current runtime.
    pub fn start(self: Arc<Self>) -> JoinHandle<DistributionResult<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Drain the queue forever, settling one message at a time.
    ///
    /// Returns only when the fallback store fails, which the broker treats
    /// as fatal.
    pub async fn run(&self) -> DistributionResult<()> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or(DistributionError::AlreadyRunning)?;

        while let Some(msg) = receiver.recv().await {
            info!(message_id = %msg.id, period = msg.period, "Processing message");

            match self.process_message(&msg).await {
                Ok(disposition) => {
                    info!(message_id = %msg.id, ?disposition, "Message settled");
                }
                Err(err) => {
                    error!(message_id = %msg.id, error = %err, "Distribution loop stopped");
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Run the retry state machine for one message.
    pub async fn process_message(&self, msg: &Message) -> DistributionResult<Disposition> {
        self.wait_for_subscribers().await;

        let mut attempted = false;
        for _ in 0..self.config.max_attempts {
            if attempted {
                tokio::time::sleep(self.config.retry_interval).await;
            }

            if self.is_reported(&msg.id) {
                self.ledger.lock().retries.remove(&msg.id);
                return Ok(Disposition::Acknowledged);
            }

            if self.registry.is_empty() {
                debug!(message_id = %msg.id, "No subscribers, backing off");
                tokio::time::sleep(self.config.backoff).await;
                attempted = false;
                continue;
            }

            attempted = true;
            match self.attempt(msg) {
                Step::Continue => {}
                Step::Acknowledged => return Ok(Disposition::Acknowledged),
                Step::Exhausted => {
                    warn!(message_id = %msg.id, "Max retries reached, archiving message");
                    self.store_message(msg).await?;
                    return Ok(Disposition::Archived);
                }
            }
        }

        if self.is_reported(&msg.id) {
            self.ledger.lock().retries.remove(&msg.id);
            return Ok(Disposition::Acknowledged);
        }

        if self.is_dispatched(&msg.id) {
            return Ok(Disposition::Dispatched);
        }

        if self.config.archive_undispatched {
            warn!(message_id = %msg.id, "Archiving message that was never dispatched");
            self.store_message(msg).await?;
            return Ok(Disposition::Archived);
        }

        warn!(message_id = %msg.id, "No subscriber accepted message, abandoning it");
        Ok(Disposition::Abandoned)
    }

    /// One attempt: count it, then either send or check the archive threshold.
    fn attempt(&self, msg: &Message) -> Step {
        let (count, dispatched) = {
            let mut ledger = self.ledger.lock();
            let count = ledger.bump(&msg.id);
            (count, ledger.dispatched.contains(&msg.id))
        };

        // A report landing between the caller's check and the bump must not
        // leave a retry entry behind.
        if self.is_reported(&msg.id) {
            self.ledger.lock().retries.remove(&msg.id);
            return Step::Acknowledged;
        }

        if dispatched {
            if count >= self.config.max_attempts {
                return Step::Exhausted;
            }
            debug!(message_id = %msg.id, attempt = count, "Awaiting acknowledgment");
            return Step::Continue;
        }

        let Some(connection) = self.registry.pick_random() else {
            debug!(message_id = %msg.id, attempt = count, "Subscribers left before send");
            return Step::Continue;
        };

        debug!(
            message_id = %msg.id,
            connection_id = connection.id(),
            attempt = count,
            "Sending message"
        );

        match connection.try_deliver(msg) {
            SendOutcome::Delivered => {
                self.ledger.lock().dispatched.insert(msg.id.clone());
                info!(
                    message_id = %msg.id,
                    connection_id = connection.id(),
                    "Dispatched message"
                );
            }
            SendOutcome::Disconnected => {
                self.registry.remove(connection.id());
            }
            SendOutcome::WouldBlock => {
                warn!(
                    message_id = %msg.id,
                    connection_id = connection.id(),
                    attempt = count,
                    "Failed to send message, subscriber busy"
                );
            }
        }

        Step::Continue
    }

    async fn wait_for_subscribers(&self) {
        while self.registry.is_empty() {
            debug!("Waiting for subscribers");
            tokio::time::sleep(self.config.backoff).await;
        }
    }

    /// Record an acknowledgment. Unknown or repeated ids are accepted.
    pub fn report_message(&self, id: &str) {
        let newly_reported = self.reported.lock().insert(id.to_string());
        self.ledger.lock().retries.remove(id);

        if newly_reported {
            info!(message_id = %id, "Message reported");
        } else {
            debug!(message_id = %id, "Duplicate report");
        }
    }

    /// Persist a message to the fallback store under its id.
    pub async fn store_message(&self, msg: &Message) -> DistributionResult<()> {
        let encoded = msg.to_json()?;
        self.store.put(&msg.id, encoded.into_bytes()).await?;
        info!(message_id = %msg.id, "Stored message in fallback store");
        Ok(())
    }

    /// Attempts recorded for `id`, or `None` once it was reported.
    pub fn retry_count(&self, id: &str) -> Option<u32> {
        self.ledger.lock().retries.get(id).copied()
    }

    pub fn is_dispatched(&self, id: &str) -> bool {
        self.ledger.lock().dispatched.contains(id)
    }

    pub fn is_reported(&self, id: &str) -> bool {
        self.reported.lock().contains(id)
    }

    /// Number of distinct messages ever dispatched.
    pub fn dispatched_count(&self) -> usize {
        self.ledger.lock().dispatched.len()
    }
}
