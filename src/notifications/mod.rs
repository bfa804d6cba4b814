//! Event bridge between the monitor and notification sinks
//!
//! The monitor never talks to a sink directly. It emits immutable
//! [`MonitorEvent`]s into a bounded [`EventQueue`]; an [`EventDispatcher`]
//! task pulls them with a timeout and fans each one out to every channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  emit (non-blocking)  ┌──────────────────┐
//! │ AvailabilityMon. │ ────────────────────▶ │    EventQueue    │
//! │ MonitorController│                       │  bounded, prio   │
//! └──────────────────┘                       └────────┬─────────┘
//!                                                     │ pull(timeout)
//!                                            ┌────────▼─────────┐
//!                                            │ EventDispatcher  │
//!                                            └────────┬─────────┘
//!                                         ┌───────────┴───────────┐
//!                                         ▼                       ▼
//!                                   ┌──────────┐           ┌──────────┐
//!                                   │   Log    │           │ Webhook  │
//!                                   │ Channel  │           │ Channel  │
//!                                   └──────────┘           └──────────┘
//! ```
//!
//! # Back-pressure
//!
//! When the queue is full, events of priority [`EventPriority::High`] or
//! above evict the oldest queued event; anything lower is dropped.

pub mod channels;
pub mod dispatcher;
pub mod queue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use channels::log::LogChannel;
pub use channels::webhook::WebhookChannel;
pub use channels::Channel;
pub use dispatcher::EventDispatcher;
pub use queue::{EmitOutcome, EventQueue, QueueStats};

/// Importance of an event, 1 (lowest) to 4 (highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EventPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl EventPriority {
    pub fn level(&self) -> u8 {
        *self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::Low),
            2 => Some(Self::Normal),
            3 => Some(Self::High),
            4 => Some(Self::Critical),
            _ => None,
        }
    }

    /// High and critical events may evict queued events when the queue is full
    pub fn may_evict(&self) -> bool {
        *self >= Self::High
    }
}

impl From<EventPriority> for u8 {
    fn from(p: EventPriority) -> Self {
        p.level()
    }
}

impl TryFrom<u8> for EventPriority {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::from_level(level).ok_or_else(|| format!("priority out of range: {level}"))
    }
}

impl std::fmt::Display for EventPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Error,
    SlotFound,
    RegistrationSuccess,
    RegistrationFailed,
    StatusUpdate,
    MonitorStarted,
    MonitorStopped,
    ConfigurationChanged,
    DatabaseUpdate,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::SlotFound => "slot_found",
            Self::RegistrationSuccess => "registration_success",
            Self::RegistrationFailed => "registration_failed",
            Self::StatusUpdate => "status_update",
            Self::MonitorStarted => "monitor_started",
            Self::MonitorStopped => "monitor_stopped",
            Self::ConfigurationChanged => "configuration_changed",
            Self::DatabaseUpdate => "database_update",
        }
    }

    /// Priority used when the emitter does not pick one
    pub fn default_priority(&self) -> EventPriority {
        match self {
            Self::Error | Self::RegistrationSuccess => EventPriority::High,
            Self::SlotFound
            | Self::RegistrationFailed
            | Self::MonitorStarted
            | Self::MonitorStopped
            | Self::ConfigurationChanged => EventPriority::Normal,
            Self::StatusUpdate | Self::DatabaseUpdate => EventPriority::Low,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Error => "🚨",
            Self::SlotFound => "🎯",
            Self::RegistrationSuccess => "✅",
            Self::RegistrationFailed => "❌",
            Self::StatusUpdate => "ℹ️",
            Self::MonitorStarted => "▶️",
            Self::MonitorStopped => "⏹️",
            Self::ConfigurationChanged => "⚙️",
            Self::DatabaseUpdate => "🗄️",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable notification record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub id: String,
    pub kind: EventKind,
    pub priority: EventPriority,
    pub message: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl MonitorEvent {
    /// Create an event with the kind's default priority and an empty payload
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            priority: kind.default_priority(),
            message: message.into(),
            payload: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn error(message: impl Into<String>, priority: EventPriority) -> Self {
        Self::new(EventKind::Error, message).with_priority(priority)
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::new(EventKind::StatusUpdate, message)
    }

    /// Human-readable line for chat-style sinks
    pub fn format_message(&self) -> String {
        format!(
            "{icon} [{kind}] {message} ({time})",
            icon = self.kind.icon(),
            kind = self.kind.as_str().to_uppercase(),
            message = self.message,
            time = self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_priorities() {
        assert_eq!(EventKind::Error.default_priority(), EventPriority::High);
        assert_eq!(
            EventKind::RegistrationSuccess.default_priority(),
            EventPriority::High
        );
        assert_eq!(EventKind::StatusUpdate.default_priority(), EventPriority::Low);
        assert_eq!(EventKind::SlotFound.default_priority(), EventPriority::Normal);
    }

    #[test]
    fn test_priority_levels() {
        assert_eq!(EventPriority::Critical.level(), 4);
        assert_eq!(EventPriority::from_level(1), Some(EventPriority::Low));
        assert_eq!(EventPriority::from_level(5), None);
        assert!(EventPriority::High.may_evict());
        assert!(!EventPriority::Normal.may_evict());
    }

    #[test]
    fn test_event_serialization() {
        let event = MonitorEvent::error("page changed", EventPriority::Critical)
            .with_payload(serde_json::json!({"fallback": true}));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["priority"], 4);
        assert_eq!(json["payload"]["fallback"], true);

        let back: MonitorEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_format_message() {
        let event = MonitorEvent::new(EventKind::SlotFound, "3 slots on 2025-08-12");
        let text = event.format_message();
        assert!(text.starts_with("🎯"));
        assert!(text.contains("SLOT_FOUND"));
        assert!(text.contains("3 slots on 2025-08-12"));
    }
}
