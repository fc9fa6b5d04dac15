//! Broker and subscriber engines wired together in one process, with the
//! HTTP hops replaced by direct calls.

use async_trait::async_trait;
use consumption_engine::{AckResult, Acknowledger, ConsumptionEngine, FatalFault};
use distribution_engine::{
    DistributionConfig, DistributionEngine, Disposition, Inbox, SubscriberRegistry,
};
use fallback_store::{FallbackStore, MemoryStore};
use stampede_core::Message;
use std::sync::Arc;
use std::time::Duration;

/// Decodes the report the way `/report` does and forwards it to the broker.
struct LoopbackAck {
    broker: Arc<DistributionEngine>,
}

#[async_trait]
impl Acknowledger for LoopbackAck {
    async fn acknowledge(&self, report: String) -> AckResult<()> {
        let id: String = serde_json::from_str(&report)?;
        self.broker.report_message(&id);
        Ok(())
    }
}

fn broker() -> (Arc<DistributionEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(DistributionEngine::new(
        DistributionConfig {
            retry_interval: Duration::from_millis(200),
            ..DistributionConfig::default()
        },
        SubscriberRegistry::new(),
        store.clone(),
    ));
    (engine, store)
}

/// Forward every pushed message to the subscriber as its JSON wire form.
fn pump(mut inbox: Inbox, subscriber: Arc<ConsumptionEngine>) {
    tokio::spawn(async move {
        while let Some(msg) = inbox.recv().await {
            let payload = msg.to_json().unwrap();
            subscriber.on_message_received(&payload).unwrap();
        }
    });
}

#[tokio::test(start_paused = true)]
async fn short_message_is_delivered_once_and_acknowledged() {
    let (broker, store) = broker();
    let subscriber = Arc::new(ConsumptionEngine::new(
        2,
        Arc::new(LoopbackAck {
            broker: broker.clone(),
        }),
    ));
    pump(broker.registry().register(2), subscriber.clone());

    let disposition = broker
        .process_message(&Message::new("m1", 50))
        .await
        .unwrap();

    assert_eq!(disposition, Disposition::Acknowledged);
    assert_eq!(broker.retry_count("m1"), None);
    assert_eq!(broker.dispatched_count(), 1);
    assert_eq!(subscriber.processed_ids(), vec!["m1".to_string()]);
    assert!(!store.contains("m1").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn slow_acknowledgment_ends_up_archived_but_still_reported() {
    let (broker, store) = broker();
    let subscriber = Arc::new(ConsumptionEngine::new(
        2,
        Arc::new(LoopbackAck {
            broker: broker.clone(),
        }),
    ));
    pump(broker.registry().register(2), subscriber.clone());

    let disposition = broker
        .process_message(&Message::new("slow", 600))
        .await
        .unwrap();
    assert_eq!(disposition, Disposition::Archived);
    assert!(store.contains("slow").await.unwrap());

    subscriber.wait_for_finished(1).await;
    assert!(broker.is_reported("slow"));
    assert_eq!(broker.retry_count("slow"), None);
}

#[tokio::test(start_paused = true)]
async fn fatal_period_is_dispatched_once_and_archived_unacknowledged() {
    let (broker, store) = broker();
    let subscriber = Arc::new(ConsumptionEngine::new(
        2,
        Arc::new(LoopbackAck {
            broker: broker.clone(),
        }),
    ));
    let mut fatal = subscriber.take_fatal_receiver().unwrap();
    pump(broker.registry().register(2), subscriber.clone());

    let disposition = broker
        .process_message(&Message::new("m2", 950))
        .await
        .unwrap();

    assert_eq!(disposition, Disposition::Archived);
    assert!(matches!(fatal.try_recv(), Ok(FatalFault::Period { period: 950, .. })));
    assert!(!broker.is_reported("m2"));
    assert!(store.contains("m2").await.unwrap());
}
