//! Channel that writes events to the tracing log

use async_trait::async_trait;

use super::{Channel, ChannelResult, DeliveryStatus};
use crate::notifications::{EventPriority, MonitorEvent};

/// Logs every event at a level matching its priority
#[derive(Debug, Default, Clone)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, event: &MonitorEvent) -> ChannelResult<DeliveryStatus> {
        let line = event.format_message();
        match event.priority {
            EventPriority::Critical => {
                tracing::error!(kind = %event.kind, priority = %event.priority, "{line}")
            }
            EventPriority::High => {
                tracing::warn!(kind = %event.kind, priority = %event.priority, "{line}")
            }
            EventPriority::Normal | EventPriority::Low => {
                tracing::info!(kind = %event.kind, priority = %event.priority, "{line}")
            }
        }
        Ok(DeliveryStatus::delivered(self.name()))
    }
}
