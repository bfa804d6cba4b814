//! Consumer task that fans queued events out to every channel

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::channels::Channel;
use super::queue::EventQueue;
use super::MonitorEvent;

/// Pulls events from the queue and delivers each one to all channels
pub struct EventDispatcher {
    queue: Arc<EventQueue>,
    channels: Vec<Arc<dyn Channel>>,
    poll_timeout: Duration,
}

impl EventDispatcher {
    pub fn new(queue: Arc<EventQueue>, poll_timeout: Duration) -> Self {
        Self {
            queue,
            channels: Vec::new(),
            poll_timeout,
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Deliver one event to every channel that accepts it
    ///
    /// Failures are logged and swallowed. Returns the number of deliveries.
    pub async fn deliver(&self, event: &MonitorEvent) -> usize {
        let mut delivered = 0;
        for channel in self.channels.iter().filter(|c| c.accepts(event)) {
            match channel.send(event).await {
                Ok(status) if status.delivered => delivered += 1,
                Ok(status) => {
                    tracing::warn!(channel = channel.name(), kind = %event.kind, %status, "Event not delivered");
                }
                Err(e) => {
                    tracing::warn!(channel = channel.name(), kind = %event.kind, error = %e, "Channel failed");
                }
            }
        }
        delivered
    }

    /// Run until `shutdown` flips to true, then drain what is left
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(channels = ?self.channel_names(), "Event dispatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                event = self.queue.pull(self.poll_timeout) => {
                    if let Some(event) = event {
                        self.deliver(&event).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        let mut drained = 0;
        while let Some(event) = self.queue.try_pull() {
            self.deliver(&event).await;
            drained += 1;
        }

        tracing::info!(drained, "Event dispatcher stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
