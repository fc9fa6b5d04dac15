//! HTTP surface of the broker.
//!
//! - `GET /task?batchsize=N` - server-sent event stream, one `data:` event
//!   per dispatched message
//! - `POST /report` - acknowledgment, body is the JSON-encoded message id

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use distribution_engine::DistributionEngine;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct BrokerState {
    pub engine: Arc<DistributionEngine>,
}

pub fn router(state: BrokerState) -> Router {
    Router::new()
        .route("/task", get(task_handler))
        .route("/report", post(report_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TaskQuery {
    batchsize: Option<String>,
}

/// Outbound buffer capacity requested by a subscriber. Missing, unparsable
/// or zero values mean 1.
fn parse_batch_size(raw: Option<&str>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|size| *size > 0)
        .unwrap_or(1)
}

/// Register a connection and stream whatever the engine dispatches to it.
///
/// The connection's inbox lives inside the response stream, so closing the
/// stream unregisters the connection.
async fn task_handler(
    State(state): State<BrokerState>,
    Query(query): Query<TaskQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let capacity = parse_batch_size(query.batchsize.as_deref());
    let inbox = state.engine.registry().register(capacity);
    info!(connection_id = inbox.id(), capacity, "Subscriber connected");

    let events = stream::unfold(inbox, |mut inbox| async move {
        let msg = inbox.recv().await?;
        let event = match msg.to_json() {
            Ok(json) => {
                debug!(connection_id = inbox.id(), message_id = %msg.id, "Pushing message");
                Event::default().data(json)
            }
            Err(err) => {
                error!(message_id = %msg.id, error = %err, "Failed to encode message");
                Event::default().comment("encode error")
            }
        };
        Some((Ok(event), inbox))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn report_handler(State(state): State<BrokerState>, body: Bytes) -> Response {
    match serde_json::from_slice::<String>(&body) {
        Ok(id) => {
            state.engine.report_message(&id);
            StatusCode::OK.into_response()
        }
        Err(err) => {
            warn!(error = %err, "Failed to decode report");
            (StatusCode::BAD_REQUEST, "Failed to decode report").into_response()
        }
    }
}
