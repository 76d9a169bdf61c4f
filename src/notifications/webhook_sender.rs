use async_trait::async_trait;
use serde::Serialize;

use crate::config::WebhookConfig;

/// External collaborator boundary (§6.2): the chat-group webhook transport.
/// Returns `false` (never an `Err`) on any non-2xx or transport failure, so
/// the manager can treat a failed send uniformly as a task-level failure.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn send(&self, webhook_url: &str, text_body: &str) -> bool;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Reference `WebhookSender`: POST JSON to the configured URL, check status.
pub struct HttpWebhookSender {
    client: reqwest::Client,
}

impl HttpWebhookSender {
    pub fn new(config: &WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
            .build()
            .expect("failed to build webhook HTTP client");
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn send(&self, webhook_url: &str, text_body: &str) -> bool {
        let payload = WebhookPayload { content: text_body };

        match self.client.post(webhook_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), webhook_url, "webhook send returned non-2xx");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, webhook_url, "webhook send failed");
                false
            }
        }
    }
}
