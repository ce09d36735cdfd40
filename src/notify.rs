// Notification sinks for lifecycle announcements.
//
// Delivery is cosmetic: callers log failures and move on.

use async_trait::async_trait;
use serde_json::json;

use crate::error::NotifyError;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &str, channel_id: &str, server_id: &str)
        -> Result<(), NotifyError>;
}

/// Writes announcements to the log only. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(
        &self,
        message: &str,
        channel_id: &str,
        server_id: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(server_id, channel_id, "Announcement:\n{message}");
        Ok(())
    }
}

/// Posts `{server_id, channel_id, content}` as JSON to a bot relay.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(
        &self,
        message: &str,
        channel_id: &str,
        server_id: &str,
    ) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "server_id": server_id,
                "channel_id": channel_id,
                "content": message,
            }))
            .send()
            .await
            .map_err(|e| NotifyError::Other(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(NotifyError::PermissionDenied {
                channel_id: channel_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(NotifyError::Other(format!("relay responded with {status}")));
        }
        Ok(())
    }
}
