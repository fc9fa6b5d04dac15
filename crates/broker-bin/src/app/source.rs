//! Message source: one generated message per produce interval.

use distribution_engine::{DistributionEngine, DistributionError};
use stampede_core::Message;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Spawn the producer. It stops when the engine's queue closes.
pub fn spawn(engine: Arc<DistributionEngine>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let msg = Message::generate();
            debug!(message_id = %msg.id, period = msg.period, "Produced message");

            match engine.enqueue(msg) {
                Ok(()) => {}
                Err(DistributionError::QueueClosed) => {
                    warn!("Distribution queue closed, stopping message source");
                    break;
                }
                Err(err) => warn!(error = %err, "Failed to enqueue message"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use distribution_engine::{DistributionConfig, SubscriberRegistry};
    use fallback_store::MemoryStore;
    use std::collections::HashSet;

    #[tokio::test(start_paused = true)]
    async fn produces_distinct_messages_with_bounded_periods() {
        let engine = Arc::new(DistributionEngine::new(
            DistributionConfig::default(),
            SubscriberRegistry::new(),
            Arc::new(MemoryStore::new()),
        ));
        let mut inbox = engine.registry().register(8);
        let distribution = engine.clone().start();
        let producer = spawn(engine.clone(), Duration::from_secs(1));

        let mut ids = HashSet::new();
        for _ in 0..3 {
            let msg = inbox.recv().await.unwrap();
            assert!(!msg.id.is_empty());
            assert!((1..=1000).contains(&msg.period));
            engine.report_message(&msg.id);
            ids.insert(msg.id);
        }
        assert_eq!(ids.len(), 3);

        producer.abort();
        distribution.abort();
    }
}
