//! HTTP delivery of acknowledgments to the broker's `/report` endpoint.

use async_trait::async_trait;
use consumption_engine::{AckError, AckResult, Acknowledger};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, warn};

/// Posts reports to `<broker_url>/report`.
pub struct HttpAcknowledger {
    client: Client,
    report_url: String,
}

impl HttpAcknowledger {
    pub fn new(client: Client, broker_url: &str) -> Self {
        Self {
            client,
            report_url: format!("{}/report", broker_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Acknowledger for HttpAcknowledger {
    async fn acknowledge(&self, report: String) -> AckResult<()> {
        debug!(url = %self.report_url, report = %report, "Sending report");

        let response = self
            .client
            .post(&self.report_url)
            .header(CONTENT_TYPE, "application/json")
            .body(report)
            .send()
            .await
            .map_err(|err| AckError::Transport(err.to_string()))?;

        // The broker only refuses malformed reports; the status is logged,
        // not treated as a transport failure.
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Broker refused report");
        }
        Ok(())
    }
}
