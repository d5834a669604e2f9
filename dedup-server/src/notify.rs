use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::NotifyMethod;
use crate::error::NotifyError;

#[derive(Debug, Serialize)]
struct CountPayload {
    count: u64,
}

/// Tells caller supplied endpoints the current in-window count.
///
/// Calls are best effort: one attempt, bounded by the client timeout, outcome logged.
#[derive(Debug, Clone)]
pub struct NotifyDispatcher {
    client: Client,
    method: NotifyMethod,
}

impl NotifyDispatcher {
    pub fn new(method: NotifyMethod, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, method })
    }

    /// Sends `count` to `endpoint` and logs the result.
    pub async fn notify(&self, endpoint: &str, count: u64) {
        match self.send(endpoint, count).await {
            Ok(status) => tracing::info!(endpoint, %status, count, "sent count notification"),
            Err(err) => tracing::error!(endpoint, %err, "failed to send count notification"),
        }
    }

    /// Sends `count` to `endpoint` and returns the response status.
    pub async fn send(&self, endpoint: &str, count: u64) -> Result<StatusCode, NotifyError> {
        let request = match self.method {
            NotifyMethod::Get => self.client.get(endpoint).query(&[("count", count)]),
            NotifyMethod::Post => self.client.post(endpoint).json(&CountPayload { count }),
        };
        let response = request.send().await?;
        Ok(response.status())
    }
}
