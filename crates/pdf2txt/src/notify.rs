//! Outbound webhook delivery.
//!
//! Delivery is best effort: one attempt, bounded by a timeout, and failures
//! are logged rather than returned.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::NotificationConfig;
use crate::sanitize::redact_url;

pub const TRUNCATION_MARKER: &str = "\n...[truncated]...";
pub const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadStatus {
    Succeeded,
    Failed,
}

/// JSON body sent to the submitter's webhook when a job finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub message: String,
    pub status: PayloadStatus,
    pub external_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookPayload {
    pub fn succeeded(external_label: &str, download_url: String, text: &str) -> Self {
        Self {
            message: "Extraction finished.".to_string(),
            status: PayloadStatus::Succeeded,
            external_label: external_label.to_string(),
            url: Some(download_url),
            excerpt: Some(excerpt(text, EXCERPT_CHARS)),
            error: None,
        }
    }

    pub fn failed(external_label: &str, error: &str) -> Self {
        Self {
            message: "Extraction failed.".to_string(),
            status: PayloadStatus::Failed,
            external_label: external_label.to_string(),
            url: None,
            excerpt: None,
            error: Some(error.to_string()),
        }
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Wraps a payload as a chat message: pretty JSON in a code block, cut to
/// `max_chars` characters plus [`TRUNCATION_MARKER`] when too long.
pub fn frame_for_chat(payload: &WebhookPayload, max_chars: usize) -> serde_json::Value {
    let pretty = serde_json::to_string_pretty(payload).unwrap_or_default();
    let body = match pretty.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &pretty[..cut], TRUNCATION_MARKER),
        None => pretty,
    };
    serde_json::json!({
        "content": format!("**Extraction finished**\n```json\n{}\n```", body)
    })
}

#[async_trait]
pub trait Notify: Send + Sync {
    /// Delivers `payload` to `url`. Never fails; problems are logged.
    async fn notify(&self, url: &str, payload: &WebhookPayload);
}

pub struct Notifier {
    client: reqwest::Client,
    chat_markers: Vec<String>,
    chat_max_chars: usize,
    operator_webhook: Option<String>,
}

impl Notifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            chat_markers: config.chat_webhook_markers.clone(),
            chat_max_chars: config.chat_max_chars,
            operator_webhook: config
                .operator_webhook
                .clone()
                .filter(|url| !url.trim().is_empty()),
        })
    }

    pub fn is_chat_webhook(&self, url: &str) -> bool {
        self.chat_markers.iter().any(|marker| url.contains(marker.as_str()))
    }

    /// Builds the request body for `url`, applying chat framing when needed.
    pub fn body_for(&self, url: &str, payload: &WebhookPayload) -> serde_json::Value {
        if self.is_chat_webhook(url) {
            frame_for_chat(payload, self.chat_max_chars)
        } else {
            serde_json::to_value(payload).unwrap_or_default()
        }
    }

    /// Sends a plain text message to the operator webhook, if one is set.
    ///
    /// `override_url` takes precedence over the configured webhook.
    pub async fn notify_operator(&self, override_url: Option<&str>, message: &str) {
        let url = override_url
            .filter(|u| !u.trim().is_empty())
            .or(self.operator_webhook.as_deref());
        let Some(url) = url else {
            log::warn!("Operator webhook not configured, skipping notification");
            return;
        };
        self.post(url, &serde_json::json!({ "content": message })).await;
    }

    async fn post(&self, url: &str, body: &serde_json::Value) {
        let target = redact_url(url);
        match self.client.post(url).json(body).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(_) => log::info!("Webhook delivered to {}", target),
                Err(e) => log::error!(
                    "Webhook to {} rejected: {}",
                    target,
                    e.status().map(|s| s.to_string()).unwrap_or_default()
                ),
            },
            Err(e) if e.is_timeout() => log::error!("Webhook to {} timed out", target),
            Err(e) => log::error!("Webhook to {} failed: {}", target, e.without_url()),
        }
    }
}

#[async_trait]
impl Notify for Notifier {
    async fn notify(&self, url: &str, payload: &WebhookPayload) {
        if url.trim().is_empty() {
            log::warn!(
                "No webhook URL for '{}', skipping notification",
                payload.external_label
            );
            return;
        }
        let body = self.body_for(url, payload);
        self.post(url, &body).await;
    }
}
