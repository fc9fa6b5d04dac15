//! The subscriber's receive loop.

use super::ack::HttpAcknowledger;
use super::sse::SseDecoder;
use anyhow::{bail, Context};
use consumption_engine::{ConsumptionEngine, Receipt};
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Timeout for establishing connections to the broker.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved runtime settings of one subscriber process.
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    pub broker_url: String,
    pub batch_size: usize,
    /// Return after this many tasks finished; `None` runs until a fault.
    pub task_limit: Option<usize>,
}

/// Connect to the broker's task stream and consume it.
///
/// Returns `Ok` once the task limit is reached. Fatal faults, malformed or
/// non-UTF-8 payloads and a lost stream are returned as errors.
pub async fn run_subscriber(settings: SubscriberSettings) -> anyhow::Result<()> {
    let client = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let engine = Arc::new(ConsumptionEngine::new(
        settings.batch_size,
        Arc::new(HttpAcknowledger::new(client.clone(), &settings.broker_url)),
    ));
    let mut fatal = engine
        .take_fatal_receiver()
        .context("fatal channel already taken")?;

    let url = format!(
        "{}/task?batchsize={}",
        settings.broker_url.trim_end_matches('/'),
        engine.batch_size()
    );
    let response = client
        .get(&url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .with_context(|| format!("failed to open task stream at {url}"))?;
    info!(url = %url, batch_size = engine.batch_size(), "Connected to broker");

    let finished = {
        let engine = engine.clone();
        async move {
            match settings.task_limit {
                Some(limit) => engine.wait_for_finished(limit).await,
                None => std::future::pending::<()>().await,
            }
        }
    };
    tokio::pin!(finished);

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new();

    loop {
        tokio::select! {
            biased;

            fault = fatal.recv() => {
                let fault = fault.context("fatal channel closed")?;
                error!(fault = %fault, "Fatal fault, shutting down");
                bail!("fatal fault: {fault}");
            }
            _ = &mut finished => {
                info!(
                    finished = engine.finished_count(),
                    processed = engine.processed_ids().len(),
                    "Task limit reached, exiting"
                );
                return Ok(());
            }
            chunk = body.next() => match chunk {
                Some(Ok(bytes)) => {
                    let payloads = decoder
                        .push(&bytes)
                        .context("task stream carried invalid UTF-8")?;
                    for payload in payloads {
                        let receipt = engine
                            .on_message_received(&payload)
                            .with_context(|| format!("malformed message from broker: {payload}"))?;
                        if receipt == Receipt::Duplicate {
                            debug!("Duplicate delivery ignored");
                        }
                    }
                }
                Some(Err(err)) => {
                    return Err(anyhow::Error::new(err).context("task stream failed"));
                }
                None => {
                    bail!(
                        "broker closed the task stream ({} bytes of partial event discarded)",
                        decoder.pending()
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::response::sse::{Event, Sse};
    use axum::routing::{get, post};
    use axum::Router;
    use futures_util::stream::{self, Stream};
    use parking_lot::Mutex;
    use std::convert::Infallible;

    #[derive(Clone)]
    struct FakeBroker {
        payloads: Arc<Vec<String>>,
        reports: Arc<Mutex<Vec<String>>>,
    }

    async fn task(
        State(broker): State<FakeBroker>,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let events: Vec<_> = broker
            .payloads
            .iter()
            .map(|payload| Ok(Event::default().data(payload.clone())))
            .collect();
        Sse::new(stream::iter(events).chain(stream::pending()))
    }

    async fn report(State(broker): State<FakeBroker>, body: Bytes) {
        broker
            .reports
            .lock()
            .push(String::from_utf8_lossy(&body).into_owned());
    }

    async fn fake_broker(payloads: &[&str]) -> (String, Arc<Mutex<Vec<String>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let state = FakeBroker {
            payloads: Arc::new(payloads.iter().map(|p| p.to_string()).collect()),
            reports: reports.clone(),
        };
        let app = Router::new()
            .route("/task", get(task))
            .route("/report", post(report))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        (format!("http://{addr}"), reports)
    }

    fn settings(broker_url: String, batch_size: usize) -> SubscriberSettings {
        SubscriberSettings {
            broker_url,
            batch_size,
            task_limit: Some(batch_size),
        }
    }

    #[tokio::test]
    async fn exits_cleanly_after_task_limit_and_reports_each_message() {
        let (url, reports) = fake_broker(&[
            r#"{"Id":"m1","Period":20}"#,
            r#"{"Id":"m1","Period":20}"#,
            r#"{"Id":"m2","Period":10}"#,
        ])
        .await;

        tokio::time::timeout(Duration::from_secs(5), run_subscriber(settings(url, 2)))
            .await
            .unwrap()
            .unwrap();

        let mut reports = reports.lock().clone();
        reports.sort();
        assert_eq!(reports, vec![r#""m1""#.to_string(), r#""m2""#.to_string()]);
    }

    #[tokio::test]
    async fn fatal_period_fails_the_run_without_report() {
        let (url, reports) = fake_broker(&[r#"{"Id":"m2","Period":950}"#]).await;

        let result =
            tokio::time::timeout(Duration::from_secs(5), run_subscriber(settings(url, 2)))
                .await
                .unwrap();

        assert!(result.unwrap_err().to_string().contains("fatal fault"));
        assert!(reports.lock().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_fails_the_run() {
        let (url, _) = fake_broker(&["not json"]).await;

        let result =
            tokio::time::timeout(Duration::from_secs(5), run_subscriber(settings(url, 2)))
                .await
                .unwrap();

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_utf8_event_fails_the_run_without_report() {
        async fn raw_task() -> impl axum::response::IntoResponse {
            let chunk: Result<Bytes, Infallible> =
                Ok(Bytes::from_static(b"data: {\"Id\":\"m\xff1\",\"Period\":5}\n\n"));
            (
                [(axum::http::header::CONTENT_TYPE, "text/event-stream")],
                axum::body::Body::from_stream(stream::iter([chunk]).chain(stream::pending())),
            )
        }

        let reports = Arc::new(Mutex::new(Vec::new()));
        let state = FakeBroker {
            payloads: Arc::new(Vec::new()),
            reports: reports.clone(),
        };
        let app = Router::new()
            .route("/task", get(raw_task))
            .route("/report", post(report))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_subscriber(settings(format!("http://{addr}"), 2)),
        )
        .await
        .unwrap();

        assert!(format!("{:#}", result.unwrap_err()).contains("invalid UTF-8"));
        assert!(reports.lock().is_empty());
    }

    #[tokio::test]
    async fn unreachable_broker_fails_the_run() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = run_subscriber(settings(format!("http://{addr}"), 2)).await;
        assert!(result.is_err());
    }
}
