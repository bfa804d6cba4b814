//! Prometheus metrics for the availability monitor
//!
//! This module provides metrics tracking for:
//! - Monitor: cycles, probes, discovered slots, state
//! - Registration: outcomes and CAPTCHA attempts
//! - Event bridge: emitted, dropped and evicted events, queue depth
//! - Control API: requests and latency
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, register_histogram_vec, Counter, CounterVec, Encoder, Gauge, GaugeVec,
    Histogram, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct MonitorMetrics {
    cycles: Counter,
    probes: CounterVec,
    probe_duration: Histogram,
    slots_discovered: Counter,
    state: GaugeVec,
    registrations: CounterVec,
    captcha_attempts: Counter,
}

struct EventMetrics {
    emitted: CounterVec,
    dropped: Counter,
    evicted: Counter,
    queue_depth: Gauge,
    api_requests: CounterVec,
    api_duration: HistogramVec,
}

static MONITOR_METRICS: OnceLock<MonitorMetrics> = OnceLock::new();
static EVENT_METRICS: OnceLock<EventMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

const MONITOR_STATES: [&str; 4] = ["standby", "active", "registering", "stopped"];

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = slotwatch::metrics::init_metrics() {
///     tracing::warn!(error = %e, "Metrics disabled");
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let monitor = MonitorMetrics {
        cycles: register_counter!(
            "slotwatch_monitor_cycles_total",
            "Total polling cycles completed"
        )?,
        probes: register_counter_vec!(
            "slotwatch_probes_total",
            "Per-date probes by result",
            &["result"]
        )?,
        probe_duration: register_histogram!(
            "slotwatch_probe_duration_seconds",
            "Per-date probe latency in seconds",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )?,
        slots_discovered: register_counter!(
            "slotwatch_slots_discovered_total",
            "Slots seen across all cycles"
        )?,
        state: register_gauge_vec!(
            "slotwatch_monitor_state",
            "Current monitor state (1 = current)",
            &["state"]
        )?,
        registrations: register_counter_vec!(
            "slotwatch_registrations_total",
            "Registration bursts by final outcome",
            &["outcome"]
        )?,
        captcha_attempts: register_counter!(
            "slotwatch_captcha_attempts_total",
            "Booking attempts made including CAPTCHA retries"
        )?,
    };

    let events = EventMetrics {
        emitted: register_counter_vec!(
            "slotwatch_events_emitted_total",
            "Events accepted by the queue by kind",
            &["kind"]
        )?,
        dropped: register_counter!(
            "slotwatch_events_dropped_total",
            "Low-priority events dropped on a full queue"
        )?,
        evicted: register_counter!(
            "slotwatch_events_evicted_total",
            "Queued events evicted to make room for high-priority events"
        )?,
        queue_depth: register_gauge!("slotwatch_event_queue_depth", "Events waiting in the queue")?,
        api_requests: register_counter_vec!(
            "slotwatch_api_requests_total",
            "Control API requests by endpoint and status",
            &["endpoint", "status"]
        )?,
        api_duration: register_histogram_vec!(
            "slotwatch_api_request_duration_seconds",
            "Control API request duration in seconds",
            &["endpoint"],
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        )?,
    };

    MONITOR_METRICS
        .set(monitor)
        .map_err(|_| "Monitor metrics already initialized")?;
    EVENT_METRICS
        .set(events)
        .map_err(|_| "Event metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    MONITOR_METRICS.get().is_some() && EVENT_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_cycle(slots: usize) {
    if let Some(m) = MONITOR_METRICS.get() {
        m.cycles.inc();
        if slots > 0 {
            m.slots_discovered.inc_by(slots as f64);
        }
    }
}

/// Record one probe; `result` is `slots`, `empty` or `error`
pub fn record_probe(result: &str, duration_secs: f64) {
    if let Some(m) = MONITOR_METRICS.get() {
        m.probes.with_label_values(&[result]).inc();
        m.probe_duration.observe(duration_secs);
    }
}

/// Mark `state` as the current monitor state
pub fn set_monitor_state(state: &str) {
    let Some(m) = MONITOR_METRICS.get() else {
        return;
    };

    for candidate in MONITOR_STATES {
        m.state
            .with_label_values(&[candidate])
            .set(if candidate == state { 1.0 } else { 0.0 });
    }
}

pub fn record_registration(outcome: &str, attempts: u32) {
    let Some(m) = MONITOR_METRICS.get() else {
        return;
    };

    m.registrations.with_label_values(&[outcome]).inc();
    m.captcha_attempts.inc_by(attempts as f64);
}

pub fn record_event_emitted(kind: &str) {
    if let Some(m) = EVENT_METRICS.get() {
        m.emitted.with_label_values(&[kind]).inc();
    }
}

pub fn record_event_dropped() {
    if let Some(m) = EVENT_METRICS.get() {
        m.dropped.inc();
    }
}

pub fn record_event_evicted() {
    if let Some(m) = EVENT_METRICS.get() {
        m.evicted.inc();
    }
}

pub fn set_queue_depth(depth: usize) {
    if let Some(m) = EVENT_METRICS.get() {
        m.queue_depth.set(depth as f64);
    }
}

/// Record API request
pub fn record_api_request(endpoint: &str, status: u16, duration_secs: f64) {
    let Some(m) = EVENT_METRICS.get() else {
        return;
    };

    let status_str = status.to_string();
    m.api_requests
        .with_label_values(&[endpoint, &status_str])
        .inc();
    m.api_duration
        .with_label_values(&[endpoint])
        .observe(duration_secs);
}

// ============================================================================
// Tests
// ============================================================================
