//! Upstream client for the streaming text-generation API

use reqwest::{header, Client, Response};
use serde_json::Value;
use tokio::time::Duration;

use crate::config::UpstreamConfig;

#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    base_url: String,
}

impl UpstreamClient {
    /// No overall timeout: a stream lasts as long as the upstream keeps it open.
    pub fn new(base_url: &str, connect_timeout_secs: u64) -> Self {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(&config.base_url, config.connect_timeout_secs)
    }

    fn build_url(&self, action: &str) -> String {
        if action.starts_with('/') {
            format!("{}{}", self.base_url, action)
        } else {
            format!("{}/{}", self.base_url, action)
        }
    }

    /// POST a streaming request. Any HTTP status is returned as `Ok`; only
    /// failing to get a response at all is an error.
    pub async fn open_stream(
        &self,
        action: &str,
        credential: &str,
        body: &Value,
    ) -> Result<Response, reqwest::Error> {
        let url = self.build_url(action);
        tracing::debug!("Opening upstream stream {}", url);

        self.http_client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "text/event-stream")
            .bearer_auth(credential)
            .json(body)
            .send()
            .await
    }
}
