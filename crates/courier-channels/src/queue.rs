//! Queue Source over HTTP: `GET` the full pending listing.

use async_trait::async_trait;
use courier_core::config::QueueConfig;
use courier_core::error::{CourierError, Result};
use courier_core::traits::QueueSource;
use courier_core::types::QueueSnapshot;

/// Polls a JSON endpoint that lists pending messages.
pub struct HttpQueueSource {
    url: String,
    empty_marker: String,
    timeout: std::time::Duration,
    client: reqwest::Client,
}

impl HttpQueueSource {
    pub fn new(config: &QueueConfig, client: reqwest::Client) -> Self {
        Self {
            url: config.url.clone(),
            empty_marker: config.empty_marker.clone(),
            timeout: config.timeout(),
            client,
        }
    }
}

/// Interpret a queue payload.
///
/// - array → records (possibly none)
/// - `{"message": "...<marker>..."}` → empty
/// - any other object → a single record
///
/// Only the marker counts as [`QueueSnapshot::Empty`]; an empty array is a
/// listing with nothing in it.
pub fn parse_queue_payload(payload: serde_json::Value, empty_marker: &str) -> QueueSnapshot {
    match payload {
        serde_json::Value::Array(items) => QueueSnapshot::Records(items),
        serde_json::Value::Object(ref map)
            if !empty_marker.is_empty()
                && map
                    .get("message")
                    .and_then(|m| m.as_str())
                    .is_some_and(|m| m.contains(empty_marker)) =>
        {
            QueueSnapshot::Empty
        }
        serde_json::Value::Null => QueueSnapshot::Records(Vec::new()),
        other => QueueSnapshot::Records(vec![other]),
    }
}

#[async_trait]
impl QueueSource for HttpQueueSource {
    fn name(&self) -> &str {
        "http-queue"
    }

    async fn fetch(&self) -> Result<QueueSnapshot> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CourierError::SourceUnavailable(format!("Queue request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::SourceUnavailable(format!(
                "Queue API error {status}: {body}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CourierError::SourceUnavailable(format!("Invalid queue response: {e}")))?;

        Ok(parse_queue_payload(payload, &self.empty_marker))
    }
}
