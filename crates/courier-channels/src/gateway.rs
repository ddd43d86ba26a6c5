//! Per-channel send endpoint.
//!
//! `POST {base_url}{channel}` with `{"number", "text"}` and the channel
//! credential in the configured auth header.

use async_trait::async_trait;
use courier_core::config::SendConfig;
use courier_core::traits::SendGateway;
use courier_core::types::{ChannelCredential, Job, SendOutcome};

pub struct HttpSendGateway {
    base_url: String,
    auth_header: String,
    timeout: std::time::Duration,
    client: reqwest::Client,
}

impl HttpSendGateway {
    pub fn new(config: &SendConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: config.base_url.clone(),
            auth_header: config.auth_header.clone(),
            timeout: config.timeout(),
            client,
        }
    }

    fn url_for(&self, channel: &str) -> String {
        format!("{}{}", self.base_url, channel)
    }
}

/// JSON body for a text send.
pub fn send_payload(job: &Job) -> serde_json::Value {
    serde_json::json!({
        "number": job.destination,
        "text": job.body,
    })
}

#[async_trait]
impl SendGateway for HttpSendGateway {
    fn name(&self) -> &str {
        "http-send"
    }

    async fn send(&self, channel: &ChannelCredential, job: &Job) -> SendOutcome {
        let result = self
            .client
            .post(self.url_for(&channel.name))
            .header(self.auth_header.as_str(), channel.credential.as_str())
            .json(&send_payload(job))
            .timeout(self.timeout)
            .send()
            .await;

        match result {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = if resp.status().is_success() {
                    String::new()
                } else {
                    resp.text().await.unwrap_or_default()
                };
                SendOutcome::from_status(status, body)
            }
            Err(e) if e.is_timeout() => SendOutcome::Transient {
                reason: format!("timed out after {:?}", self.timeout),
            },
            Err(e) => SendOutcome::Transient {
                reason: format!("request failed: {e}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_payload() {
        let job = Job::new(1, "51967371218", "hola");
        assert_eq!(
            send_payload(&job),
            serde_json::json!({"number": "51967371218", "text": "hola"})
        );
    }

    #[test]
    fn test_url_appends_channel() {
        let gw = HttpSendGateway::new(&SendConfig::default(), reqwest::Client::new());
        assert_eq!(
            gw.url_for("Avisos-01"),
            "http://localhost:8080/message/sendText/Avisos-01"
        );
    }
}
