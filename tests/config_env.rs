//! Environment overrides. Kept in its own test binary since it mutates the
//! process environment.

use std::fs;

use iom_daq::config::AppConfig;
use tempfile::tempdir;

#[test]
fn test_env_overrides_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("iom.toml");
    fs::write(
        &path,
        "[application]\nlog_level = \"info\"\n[chassis]\nip = \"local\"\n",
    )
    .expect("write config");

    std::env::set_var("IOM_DAQ_APPLICATION__LOG_LEVEL", "debug");
    std::env::set_var("IOM_DAQ_CHASSIS__CONNECTION_TIMEOUT_MS", "500");
    let config = AppConfig::load_from(&path).expect("load");
    std::env::remove_var("IOM_DAQ_APPLICATION__LOG_LEVEL");
    std::env::remove_var("IOM_DAQ_CHASSIS__CONNECTION_TIMEOUT_MS");

    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.chassis.connection_timeout_ms, Some(500));
}
