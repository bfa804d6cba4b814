//! Notification channels for delivering monitor events
//!
//! A channel is any sink that can accept a [`MonitorEvent`]. Delivery
//! failures are reported back to the dispatcher and never reach the monitor.

pub mod log;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::notifications::{EventPriority, MonitorEvent};

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors a channel can report for a single event
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sink answered with a server error, worth another try
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// Sink refused the event itself; retrying will not help
    #[error("Sink rejected the event with HTTP {0}")]
    Rejected(u16),

    #[error("Channel error: {0}")]
    Other(String),
}

/// What happened to one event on one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    pub channel: String,
    pub delivered: bool,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl DeliveryStatus {
    pub fn delivered(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered: true,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn rejected(channel: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            delivered: false,
            detail: Some(detail.into()),
            at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.delivered { "delivered" } else { "rejected" };
        write!(f, "{} {verdict}", self.channel)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// A sink for monitor events
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Lowest priority this channel wants to receive
    fn min_priority(&self) -> EventPriority {
        EventPriority::Low
    }

    fn accepts(&self, event: &MonitorEvent) -> bool {
        event.priority >= self.min_priority()
    }

    async fn send(&self, event: &MonitorEvent) -> ChannelResult<DeliveryStatus>;
}

impl ChannelError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(e) => e.is_timeout() || e.is_connect(),
            Self::Unavailable(_) => true,
            Self::InvalidConfig(_) | Self::Rejected(_) | Self::Other(_) => false,
        }
    }
}
