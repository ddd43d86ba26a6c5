//! Delivery Sink over HTTP: best-effort outcome confirmations.

use async_trait::async_trait;
use courier_core::config::SinkConfig;
use courier_core::error::{CourierError, Result};
use courier_core::traits::DeliverySink;
use courier_core::types::DeliveryReport;

pub struct HttpDeliverySink {
    url: String,
    timeout: std::time::Duration,
    client: reqwest::Client,
}

impl HttpDeliverySink {
    pub fn new(config: &SinkConfig, client: reqwest::Client) -> Self {
        Self {
            url: config.url.clone(),
            timeout: config.timeout(),
            client,
        }
    }
}

#[async_trait]
impl DeliverySink for HttpDeliverySink {
    fn name(&self) -> &str {
        "http-sink"
    }

    async fn confirm(&self, report: &DeliveryReport) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(report)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CourierError::Sink(format!("Confirmation send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!(
                "✅ Confirmed #{} via {} (code {})",
                report.message_id,
                report.channel_name,
                report.outcome_code.code()
            );
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(CourierError::Sink(format!("Sink error {status}: {body}")))
        }
    }
}
