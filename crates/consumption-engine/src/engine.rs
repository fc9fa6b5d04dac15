//! Dedup, admission and fault policy for pushed messages.

use crate::{AckResult, Acknowledger, ConsumeResult};
use futures_util::FutureExt;
use parking_lot::Mutex;
use stampede_core::{Message, MessageId};
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Periods above this many milliseconds bring the whole subscriber down.
pub const FATAL_PERIOD_THRESHOLD_MS: u64 = 900;

/// Periods above this many milliseconds fail only their own task.
pub const LOCAL_FAULT_THRESHOLD_MS: u64 = 800;

/// What `on_message_received` did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    /// First sighting; a processing task was started.
    Spawned,
    /// Id seen before; the payload was discarded.
    Duplicate,
}

/// How a processing task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processed and acknowledged.
    Completed,
    /// Refused because `batch_size` tasks were already active.
    Rejected,
    /// Failed inside its own task; not acknowledged.
    LocalFault,
    /// Failed in a way that requires the subscriber to exit.
    FatalFault,
}

/// Reason the subscriber must terminate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalFault {
    /// Message period above [`FATAL_PERIOD_THRESHOLD_MS`].
    Period { id: MessageId, period: u64 },
    /// Acknowledgment could not be delivered.
    Acknowledgment { id: MessageId, error: String },
}

impl fmt::Display for FatalFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalFault::Period { id, period } => {
                write!(f, "message {id} has fatal period {period}ms")
            }
            FatalFault::Acknowledgment { id, error } => {
                write!(f, "failed to acknowledge message {id}: {error}")
            }
        }
    }
}

/// Holds one of the `batch_size` worker slots until dropped.
struct WorkerSlot<'a> {
    active: &'a AtomicUsize,
}

impl Drop for WorkerSlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Subscriber consumption engine.
pub struct ConsumptionEngine {
    batch_size: usize,
    acknowledger: Arc<dyn Acknowledger>,
    seen: Mutex<HashSet<MessageId>>,
    processed: Mutex<Vec<MessageId>>,
    active: AtomicUsize,
    finished: watch::Sender<usize>,
    fatal_tx: mpsc::UnboundedSender<FatalFault>,
    fatal_rx: Mutex<Option<mpsc::UnboundedReceiver<FatalFault>>>,
}

impl ConsumptionEngine {
    /// Create an engine admitting at most `batch_size` concurrent tasks.
    pub fn new(batch_size: usize, acknowledger: Arc<dyn Acknowledger>) -> Self {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let (finished, _) = watch::channel(0);

        Self {
            batch_size: batch_size.max(1),
            acknowledger,
            seen: Mutex::new(HashSet::new()),
            processed: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            finished,
            fatal_tx,
            fatal_rx: Mutex::new(Some(fatal_rx)),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Take the receiving end of the fatal channel. Only the first call
    /// returns it.
    pub fn take_fatal_receiver(&self) -> Option<mpsc::UnboundedReceiver<FatalFault>> {
        self.fatal_rx.lock().take()
    }

    /// Decode a pushed payload and start processing it unless its id was
    /// already seen. Never waits for processing.
    pub fn on_message_received(self: &Arc<Self>, payload: &str) -> ConsumeResult<Receipt> {
        let msg = Message::from_json(payload)?;

        if !self.seen.lock().insert(msg.id.clone()) {
            info!(message_id = %msg.id, "Discarding duplicate message");
            return Ok(Receipt::Duplicate);
        }

        debug!(message_id = %msg.id, period = msg.period, "Received message");

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let id = msg.id.clone();
            let outcome = engine.process_message(msg).await;
            debug!(message_id = %id, ?outcome, "Task finished");
            engine.finished.send_modify(|count| *count += 1);
        });

        Ok(Receipt::Spawned)
    }

    /// Process one message inside a worker slot.
    pub async fn process_message(&self, msg: Message) -> Outcome {
        let Some(_slot) = self.try_admit() else {
            warn!(
                message_id = %msg.id,
                batch_size = self.batch_size,
                "Worker pool full, dropping message"
            );
            return Outcome::Rejected;
        };

        self.processed.lock().push(msg.id.clone());

        if msg.period > FATAL_PERIOD_THRESHOLD_MS {
            error!(message_id = %msg.id, period = msg.period, "Fatal fault while processing");
            self.raise_fatal(FatalFault::Period {
                id: msg.id,
                period: msg.period,
            });
            return Outcome::FatalFault;
        }

        // Panics from a task's own work stay inside that task.
        match AssertUnwindSafe(self.work(&msg)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| panic.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown panic");
                warn!(message_id = %msg.id, reason, "Recovered from task failure");
                Outcome::LocalFault
            }
        }
    }

    async fn work(&self, msg: &Message) -> Outcome {
        if msg.period > LOCAL_FAULT_THRESHOLD_MS {
            warn!(message_id = %msg.id, period = msg.period, "Local fault, message dropped");
            return Outcome::LocalFault;
        }

        tokio::time::sleep(Duration::from_millis(msg.period)).await;

        match self.send_acknowledgment(&msg.id).await {
            Ok(()) => {
                info!(message_id = %msg.id, period = msg.period, "Processed message");
                Outcome::Completed
            }
            Err(err) => {
                error!(message_id = %msg.id, error = %err, "Failed to acknowledge message");
                self.raise_fatal(FatalFault::Acknowledgment {
                    id: msg.id.clone(),
                    error: err.to_string(),
                });
                Outcome::FatalFault
            }
        }
    }

    /// Encode `id` as a JSON string and hand it to the acknowledger.
    pub async fn send_acknowledgment(&self, id: &str) -> AckResult<()> {
        let report = serde_json::to_string(id)?;
        self.acknowledger.acknowledge(report).await
    }

    fn try_admit(&self) -> Option<WorkerSlot<'_>> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = WorkerSlot {
            active: &self.active,
        };
        if active > self.batch_size {
            return None;
        }
        Some(slot)
    }

    fn raise_fatal(&self, fault: FatalFault) {
        if self.fatal_tx.send(fault).is_err() {
            debug!("Fatal channel has no receiver");
        }
    }

    /// Resolve once at least `count` spawned tasks have finished.
    pub async fn wait_for_finished(&self, count: usize) {
        let mut finished = self.finished.subscribe();
        // The sender lives in self, so the channel cannot close here.
        let _ = finished.wait_for(|done| *done >= count).await;
    }

    /// Number of spawned tasks that have finished, whatever their outcome.
    pub fn finished_count(&self) -> usize {
        *self.finished.borrow()
    }

    /// Number of tasks currently holding a worker slot.
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Ids admitted for processing, in admission order.
    pub fn processed_ids(&self) -> Vec<MessageId> {
        self.processed.lock().clone()
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }
}
