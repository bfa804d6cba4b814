//! Tests for the shipped config.toml

use slotwatch::config::Config;
use slotwatch::scheduler::MonitorSettings;
use std::path::Path;

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_config_toml_has_sections() {
    let content =
        std::fs::read_to_string("config.toml").expect("Should be able to read config.toml");

    for section in [
        "[site]",
        "[monitor]",
        "[registration]",
        "[captcha]",
        "[store]",
        "[events]",
        "[control]",
        "[logging]",
    ] {
        assert!(content.contains(section), "config.toml should have {section} section");
    }
}

#[test]
fn test_config_toml_loads_and_validates() {
    let config = Config::from_file(Path::new("config.toml")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.site.room, "A1");
    assert_eq!(config.monitor.poll_interval_ms, 500);
    assert_eq!(config.registration.max_captcha_retries, 12);
    assert_eq!(config.events.queue_capacity, 1000);
    assert_eq!(
        config.monitor.results_dir.as_deref(),
        Some(Path::new("data/results"))
    );
}

#[test]
fn test_config_toml_builds_monitor_settings() {
    let config = Config::from_file(Path::new("config.toml")).unwrap();
    let settings = MonitorSettings::from_config(&config).unwrap();

    assert_eq!(settings.room, "A1");
    assert_eq!(settings.probe_workers, 8);
    assert!(settings.auto_registration);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "[site]\nroom = \"B2\"\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.site.room, "B2");
    assert_eq!(config.site.timezone, "Europe/Warsaw");
    assert_eq!(config.monitor.same_day_buffer_mins, 180);
}
