use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use slotwatch::captcha::TrueCaptchaSolver;
use slotwatch::config::Config;
use slotwatch::control::ControlServer;
use slotwatch::metrics;
use slotwatch::notifications::channels::webhook::WebhookConfig;
use slotwatch::notifications::{EventDispatcher, EventPriority, EventQueue, LogChannel, WebhookChannel};
use slotwatch::scheduler::{MonitorController, MonitorOverrides, MonitorSettings, SiteBackend};
use slotwatch::storage::create_sqlite_store;
use slotwatch::utils::format_duration;

/// Options for the long-running monitor
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    pub overrides: MonitorOverrides,
    /// Leave the monitor stopped until started over the control API
    pub idle: bool,
    pub without_control: bool,
}

/// Run monitor, event dispatcher and control server until Ctrl-C
pub async fn run(config: Config, params: RunParams) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registration failed");
    }

    let store = create_sqlite_store(&config.store.sqlite_path).with_context(|| {
        format!(
            "Failed to open registrant store at {}",
            config.store.sqlite_path.display()
        )
    })?;

    let solver = TrueCaptchaSolver::new(&config.captcha, config.request_timeout())
        .context("Failed to build CAPTCHA client")?;
    let backend = SiteBackend::new(config.clone(), Arc::new(solver));

    let events = Arc::new(EventQueue::new(config.events.queue_capacity));
    let settings = MonitorSettings::from_config(&config)?;

    let controller = Arc::new(MonitorController::new(
        Arc::new(backend),
        store,
        Arc::clone(&events),
        settings,
    ));

    // Event consumer
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut dispatcher = EventDispatcher::new(
        Arc::clone(&events),
        Duration::from_millis(config.events.poll_timeout_ms),
    )
    .with_channel(Arc::new(LogChannel::new()));

    if let Some(url) = &config.events.webhook_url {
        let min_priority = EventPriority::from_level(config.events.webhook_min_priority)
            .unwrap_or(EventPriority::Low);
        let webhook = WebhookChannel::new(WebhookConfig::new(url.clone()).with_min_priority(min_priority))
            .map_err(|e| anyhow::anyhow!("Invalid webhook: {e}"))?;
        dispatcher = dispatcher.with_channel(Arc::new(webhook));
    }
    let dispatcher_handle = dispatcher.spawn(shutdown_rx.clone());

    // Control surface
    let server_handle = if params.without_control {
        None
    } else {
        let server = ControlServer::new(&config.control.bind_addr, Arc::clone(&controller))?;
        let mut server_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            let signal = async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = server.serve(signal).await {
                tracing::error!(error = %e, "Control server failed");
            }
        }))
    };

    if !params.idle {
        controller.start(params.overrides).await?;
    }

    println!("slotwatch running (room {}). Press Ctrl-C to stop.", config.site.room);
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    match controller.stop().await {
        Ok(stats) => {
            println!();
            println!("Monitor Summary");
            println!("===============");
            if let Some(uptime) = stats.uptime().and_then(|d| d.to_std().ok()) {
                println!("  Uptime:        {}", format_duration(uptime));
            }
            println!("  Cycles:        {}", stats.cycles);
            println!("  Probes:        {}", stats.checks_performed);
            println!("  Slots seen:    {}", stats.slots_found);
            println!("  Registrations: {} ok / {} failed", stats.registrations_succeeded, stats.registrations_failed);
            println!("  CAPTCHA tries: {}", stats.captcha_attempts);
        }
        Err(e) => tracing::debug!(error = %e, "Monitor was not running"),
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_handle.await {
        tracing::warn!(error = %e, "Event dispatcher ended abnormally");
    }
    if let Some(handle) = server_handle {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Control server task ended abnormally");
        }
    }

    Ok(())
}
