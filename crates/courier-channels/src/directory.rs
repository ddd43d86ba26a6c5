//! Channel Directory over HTTP: lists provisioned channels and their status.

use async_trait::async_trait;
use courier_core::config::DirectoryConfig;
use courier_core::error::{CourierError, Result};
use courier_core::traits::ChannelDirectory;
use courier_core::types::DirectoryEntry;

pub struct HttpChannelDirectory {
    url: String,
    api_key: Option<String>,
    auth_header: String,
    timeout: std::time::Duration,
    client: reqwest::Client,
}

impl HttpChannelDirectory {
    pub fn new(config: &DirectoryConfig, client: reqwest::Client) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            auth_header: config.auth_header.clone(),
            timeout: config.timeout(),
            client,
        }
    }
}

/// Decode a directory listing, skipping entries without a name.
pub fn parse_directory(payload: serde_json::Value) -> Result<Vec<DirectoryEntry>> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(CourierError::SourceUnavailable(format!(
                "Directory response is not a list: {other}"
            )));
        }
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        match serde_json::from_value::<DirectoryEntry>(item) {
            Ok(entry) if !entry.name.is_empty() => entries.push(entry),
            Ok(_) => tracing::debug!("Directory entry without a name skipped"),
            Err(e) => tracing::debug!("Malformed directory entry skipped: {e}"),
        }
    }
    Ok(entries)
}

#[async_trait]
impl ChannelDirectory for HttpChannelDirectory {
    fn name(&self) -> &str {
        "http-directory"
    }

    async fn fetch(&self) -> Result<Vec<DirectoryEntry>> {
        let mut req = self
            .client
            .get(&self.url)
            .timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.header(self.auth_header.as_str(), key.as_str());
        }

        let response = req
            .send()
            .await
            .map_err(|e| CourierError::SourceUnavailable(format!("Directory request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(CourierError::SourceUnavailable(format!(
                "Directory API error {status}"
            )));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| {
            CourierError::SourceUnavailable(format!("Invalid directory response: {e}"))
        })?;
        parse_directory(payload)
    }
}
