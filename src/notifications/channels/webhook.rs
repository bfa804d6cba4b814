//! Webhook notification channel
//!
//! POSTs each event as JSON, e.g. to a chat-bot relay.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Channel, ChannelError, ChannelResult, DeliveryStatus};
use crate::notifications::{EventPriority, MonitorEvent};
use crate::utils::retry::{with_retry_if, RetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Sent as a Bearer token when present
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts after a timeout or a 5xx
    pub max_retries: u32,
    pub min_priority: EventPriority,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            timeout_secs: 5,
            max_retries: 2,
            min_priority: EventPriority::Low,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_min_priority(mut self, priority: EventPriority) -> Self {
        self.min_priority = priority;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.url).map_err(|e| format!("Invalid webhook URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported webhook scheme: {}", url.scheme()));
        }
        if self.timeout_secs == 0 {
            return Err("Webhook timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Forwards events to an HTTP endpoint
///
/// Body sent for each event:
///
/// ```json
/// {
///   "id": "event-uuid",
///   "kind": "registration_success",
///   "priority": 3,
///   "text": "✅ [REGISTRATION_SUCCESS] Anna Kowalska booked 2025-08-12 09:00 (...)",
///   "message": "Anna Kowalska booked 2025-08-12 09:00",
///   "payload": { "registrant_id": 7, "reservation_id": "X7K2PQ" },
///   "timestamp": "2025-08-01T12:00:00Z"
/// }
/// ```
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
    retry: RetryConfig,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> ChannelResult<Self> {
        config.validate().map_err(ChannelError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::Other(format!("Failed to create HTTP client: {e}")))?;
        let retry = RetryConfig::with_delays(config.max_retries, 500, 4_000);

        Ok(Self {
            config,
            client,
            retry,
        })
    }

    pub fn from_url(url: impl Into<String>) -> ChannelResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn build_payload(&self, event: &MonitorEvent) -> serde_json::Value {
        serde_json::json!({
            "id": event.id,
            "kind": event.kind.as_str(),
            "priority": event.priority.level(),
            "text": event.format_message(),
            "message": event.message,
            "payload": event.payload,
            "timestamp": event.timestamp.to_rfc3339(),
        })
    }

    async fn post(&self, body: &serde_json::Value) -> ChannelResult<u16> {
        let mut request = self.client.post(&self.config.url).json(body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else if status.is_server_error() {
            Err(ChannelError::Unavailable(format!("HTTP {status}")))
        } else {
            Err(ChannelError::Rejected(status.as_u16()))
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn min_priority(&self) -> EventPriority {
        self.config.min_priority
    }

    async fn send(&self, event: &MonitorEvent) -> ChannelResult<DeliveryStatus> {
        let body = self.build_payload(event);

        match with_retry_if(&self.retry, || self.post(&body), ChannelError::is_retryable).await {
            Ok(status) => {
                tracing::debug!(url = %self.config.url, kind = %event.kind, status, "Webhook delivered");
                Ok(DeliveryStatus::delivered(self.name()).with_detail(format!("HTTP {status}")))
            }
            Err(e) => {
                tracing::warn!(url = %self.config.url, kind = %event.kind, error = %e, "Webhook delivery failed");
                Ok(DeliveryStatus::rejected(self.name(), e.to_string()))
            }
        }
    }
}
