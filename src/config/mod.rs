//! Configuration management for slotwatch
//!
//! This module handles loading and validating configuration from environment variables,
//! files, and command-line arguments.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Booking site configuration
    pub site: SiteConfig,

    /// Availability monitor configuration
    pub monitor: MonitorConfig,

    /// Registration submitter configuration
    pub registration: RegistrationConfig,

    /// CAPTCHA recognition service configuration
    pub captcha: CaptchaConfig,

    /// Registrant store configuration
    pub store: StoreConfig,

    /// Event bridge configuration
    pub events: EventsConfig,

    /// Operator control surface configuration
    pub control: ControlConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Booking site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Base URL of the booking site (must end with a slash)
    pub base_url: String,

    /// Room identifier, two characters (e.g. "A1")
    pub room: String,

    /// Timeout applied to every outbound request, in seconds
    pub request_timeout_secs: u64,

    /// IANA timezone the site schedules in
    pub timezone: String,

    /// Optional fixed user agent; a rotating pool is used when absent
    pub user_agent: Option<String>,
}

/// Availability monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Wait between ACTIVE polling cycles, in milliseconds
    pub poll_interval_ms: u64,

    /// Registrant re-check interval while in STANDBY, in seconds
    pub standby_recheck_secs: u64,

    /// Registrant re-check interval while ACTIVE, in seconds
    pub registrant_recheck_secs: u64,

    /// Width of the per-date probe pool
    pub probe_workers: usize,

    /// Minimum lead time for same-day slots, in minutes
    pub same_day_buffer_mins: i64,

    /// Delay between probes issued outside the pool, in milliseconds
    pub sequential_probe_delay_ms: u64,

    /// Submit registrations automatically when slots appear
    pub auto_registration: bool,

    /// Directory receiving the availability snapshot written at stop
    pub results_dir: Option<PathBuf>,
}

/// Registration submitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Extra attempts after a rejected CAPTCHA
    pub max_captcha_retries: u32,

    /// Extra attempts after a transient network failure
    pub max_network_retries: u32,

    /// Base backoff for network retries, in milliseconds
    pub network_backoff_ms: u64,
}

/// CAPTCHA recognition service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Recognition endpoint
    pub service_url: String,

    /// Account identifier
    pub user_id: String,

    /// API key
    pub api_key: String,
}

/// Registrant store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// Event bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Maximum number of queued events
    pub queue_capacity: usize,

    /// Consumer pull timeout, in milliseconds
    pub poll_timeout_ms: u64,

    /// Webhook receiving events as JSON (e.g. a chat relay)
    pub webhook_url: Option<String>,

    /// Lowest event priority (1-4) forwarded to the webhook
    pub webhook_min_priority: u8,
}

/// Operator control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Address the HTTP control API binds to
    pub bind_addr: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://olsztyn.uw.gov.pl/wizytakartapolaka/"),
            room: String::from("A1"),
            request_timeout_secs: 5,
            timezone: String::from("Europe/Warsaw"),
            user_agent: None,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            standby_recheck_secs: 600,
            registrant_recheck_secs: 10,
            probe_workers: 8,
            same_day_buffer_mins: 180,
            sequential_probe_delay_ms: 200,
            auto_registration: true,
            results_dir: None,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_captcha_retries: 12,
            max_network_retries: 3,
            network_backoff_ms: 2000,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            service_url: String::from("https://api.apitruecaptcha.org/one/gettext"),
            user_id: String::new(),
            api_key: String::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/registrants.db"),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            poll_timeout_ms: 1000,
            webhook_url: None,
            webhook_min_priority: 1,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::from("127.0.0.1:8088"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let site = SiteConfig {
            base_url: env_or("SLOTWATCH_BASE_URL", defaults.site.base_url),
            room: env_or("SLOTWATCH_ROOM", defaults.site.room),
            request_timeout_secs: env_or(
                "SLOTWATCH_REQUEST_TIMEOUT",
                defaults.site.request_timeout_secs,
            ),
            timezone: env_or("SLOTWATCH_TIMEZONE", defaults.site.timezone),
            user_agent: std::env::var("SLOTWATCH_USER_AGENT").ok(),
        };

        let monitor = MonitorConfig {
            poll_interval_ms: env_or("SLOTWATCH_POLL_INTERVAL_MS", defaults.monitor.poll_interval_ms),
            standby_recheck_secs: env_or(
                "SLOTWATCH_STANDBY_RECHECK_SECS",
                defaults.monitor.standby_recheck_secs,
            ),
            registrant_recheck_secs: env_or(
                "SLOTWATCH_REGISTRANT_RECHECK_SECS",
                defaults.monitor.registrant_recheck_secs,
            ),
            probe_workers: env_or("SLOTWATCH_PROBE_WORKERS", defaults.monitor.probe_workers),
            same_day_buffer_mins: env_or(
                "SLOTWATCH_SAME_DAY_BUFFER_MINS",
                defaults.monitor.same_day_buffer_mins,
            ),
            sequential_probe_delay_ms: defaults.monitor.sequential_probe_delay_ms,
            auto_registration: env_or(
                "SLOTWATCH_AUTO_REGISTRATION",
                defaults.monitor.auto_registration,
            ),
            results_dir: std::env::var("SLOTWATCH_RESULTS_DIR").ok().map(PathBuf::from),
        };

        let registration = RegistrationConfig {
            max_captcha_retries: env_or(
                "SLOTWATCH_MAX_CAPTCHA_RETRIES",
                defaults.registration.max_captcha_retries,
            ),
            max_network_retries: env_or(
                "SLOTWATCH_MAX_NETWORK_RETRIES",
                defaults.registration.max_network_retries,
            ),
            network_backoff_ms: defaults.registration.network_backoff_ms,
        };

        let captcha = CaptchaConfig {
            service_url: env_or("SLOTWATCH_CAPTCHA_URL", defaults.captcha.service_url),
            user_id: std::env::var("CAPTCHA_USER_ID").unwrap_or_default(),
            api_key: std::env::var("CAPTCHA_API_KEY").unwrap_or_default(),
        };

        let store = StoreConfig {
            sqlite_path: std::env::var("SLOTWATCH_SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store.sqlite_path),
        };

        let events = EventsConfig {
            queue_capacity: env_or("SLOTWATCH_QUEUE_CAPACITY", defaults.events.queue_capacity),
            poll_timeout_ms: defaults.events.poll_timeout_ms,
            webhook_url: std::env::var("SLOTWATCH_WEBHOOK_URL").ok(),
            webhook_min_priority: env_or(
                "SLOTWATCH_WEBHOOK_MIN_PRIORITY",
                defaults.events.webhook_min_priority,
            ),
        };

        let control = ControlConfig {
            bind_addr: env_or("SLOTWATCH_BIND_ADDR", defaults.control.bind_addr),
        };

        let logging = LoggingConfig {
            level: env_or("SLOTWATCH_LOG_LEVEL", defaults.logging.level),
            format: env_or("SLOTWATCH_LOG_FORMAT", defaults.logging.format),
        };

        Ok(Self {
            site,
            monitor,
            registration,
            captcha,
            store,
            events,
            control,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.site.base_url)
            .with_context(|| format!("Invalid base_url: {}", self.site.base_url))?;

        if !self.site.base_url.ends_with('/') {
            anyhow::bail!("base_url must end with '/'");
        }

        if self.site.room.chars().count() != 2 {
            anyhow::bail!("room must be exactly two characters, got '{}'", self.site.room);
        }

        if !(1..=9).contains(&self.site.request_timeout_secs) {
            anyhow::bail!("request_timeout_secs must be between 1 and 9");
        }

        self.site_timezone()?;

        if self.monitor.probe_workers == 0 {
            anyhow::bail!("probe_workers must be greater than 0");
        }

        if self.monitor.same_day_buffer_mins < 0 {
            anyhow::bail!("same_day_buffer_mins must not be negative");
        }

        if self.events.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if !(1..=4).contains(&self.events.webhook_min_priority) {
            anyhow::bail!("webhook_min_priority must be between 1 and 4");
        }

        Ok(())
    }

    /// Parse the site timezone
    pub fn site_timezone(&self) -> Result<Tz> {
        self.site
            .timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {e}", self.site.timezone))
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.site.request_timeout_secs)
    }
}
