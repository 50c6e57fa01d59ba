//! Application configuration using Figment
//!
//! Configuration is loaded from:
//! 1. A TOML file (base configuration)
//! 2. Environment variables prefixed with `IOM_DAQ_`, nested keys joined by
//!    `__` (e.g. `IOM_DAQ_APPLICATION__LOG_LEVEL=debug`,
//!    `IOM_DAQ_CHASSIS__PORT=6334`)
//!
//! # Example
//! ```no_run
//! use iom_daq::config::AppConfig;
//!
//! let config = AppConfig::load_from("config/iom.example.toml")?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), figment::Error>(())
//! ```

use std::collections::HashSet;
use std::path::Path;

use daq_core::error::DaqError;
use daq_driver_iom::{ConnectionConfig, SimulatorConfig};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Chassis connection, devices and maps
    pub chassis: ConnectionConfig,
    /// Simulated chassis standing in for hardware
    #[serde(default)]
    pub simulator: Option<SimulatorConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_name() -> String {
    "iom-daq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Figment for `path` merged with the environment overrides.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("IOM_DAQ_").split("__"))
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// Checks that need the whole file; connection-level rules run in
    /// `ConnectionManager::initialise`.
    pub fn validate(&self) -> Result<(), DaqError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if let Some(simulator) = &self.simulator {
            let mut slots = HashSet::new();
            for slot in &simulator.slots {
                if !slots.insert(slot.devn) {
                    return Err(DaqError::Configuration(format!(
                        "Simulator slot {} is declared twice",
                        slot.devn
                    )));
                }
            }
        }

        self.chassis.address()?;
        Ok(())
    }
}
