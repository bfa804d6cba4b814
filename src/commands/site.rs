use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::time::Duration;

use slotwatch::config::Config;
use slotwatch::crawler::{AvailabilitySource, SiteFetcher};
use slotwatch::scheduler::{apply_same_day_cutoff, is_business_day, site_now};

fn fetcher(config: &Config) -> Result<SiteFetcher> {
    let delay = Duration::from_millis(config.monitor.sequential_probe_delay_ms);
    SiteFetcher::new(&config.site, delay).context("Failed to create site fetcher")
}

/// Probe a single date once and print the open times
pub async fn probe(config: Config, date: NaiveDate, raw: bool) -> Result<()> {
    let fetcher = fetcher(&config)?;

    println!("Probing room {} on {date}", fetcher.room());
    if !is_business_day(date) {
        println!("  (weekend: the site never opens slots on this day)");
    }

    let times = fetcher
        .probe_date_paced(date)
        .await
        .with_context(|| format!("Probe for {date} failed"))?;

    let times = if raw {
        times
    } else {
        let tz = config.site_timezone()?;
        let buffer = chrono::Duration::minutes(config.monitor.same_day_buffer_mins);
        apply_same_day_cutoff(times, date, site_now(tz), buffer)
    };

    if times.is_empty() {
        println!("  No open slots");
    } else {
        for time in &times {
            println!("  {}", time.format("%H:%M"));
        }
        println!("  {} slot(s)", times.len());
    }

    Ok(())
}

/// Print the booking page's datepicker window
pub async fn constraints(config: Config) -> Result<()> {
    let fetcher = fetcher(&config)?;
    let window = fetcher
        .fetch_constraints()
        .await
        .context("Failed to read the booking page window")?;

    println!("Datepicker window for room {}", fetcher.room());
    println!("================================");
    println!("  First date: {}", window.min_date);
    println!("  Last date:  {}", window.max_date);
    println!("  Disabled:   {}", window.disabled.len());
    for date in &window.disabled {
        println!("    {date}");
    }

    Ok(())
}
