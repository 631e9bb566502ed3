use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::Transport;
use crate::error::{Result, RoadTrackerError};

/// Posts each message to `{base_url}/{topic}/` on the store service
///
/// # Error Handling
/// - Connection refused / timeout: `TransportUnavailable`
/// - Non-2xx status: `TransportUnavailable` carrying the status code
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("road_tracker/0.1.0")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, topic: &str) -> String {
        format!("{}/{}/", self.base_url, topic.trim_matches('/'))
    }

    async fn post(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let url = self.endpoint(topic);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RoadTrackerError::TransportUnavailable(format!("timeout posting to {}", url))
                } else {
                    RoadTrackerError::TransportUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoadTrackerError::TransportUnavailable(format!(
                "{} returned status {}",
                url,
                status.as_u16()
            )));
        }

        Ok(())
    }
}

impl Transport for HttpTransport {
    fn publish<'a>(&'a self, topic: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        self.post(topic, payload).boxed()
    }
}
