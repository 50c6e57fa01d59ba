//! Typed connection configuration.
//!
//! ```toml
//! ip = [192, 168, 100, 2]      # or ip = "local"
//! port = 6334                  # required for a remote chassis
//! connection_timeout_ms = 200
//!
//! [[devices]]
//! name = "dio0"
//! class = "dio-404"
//! devn = 0
//! [devices.config]
//! voltage_reference = 24.0
//!
//! [[maps]]
//! name = "fast"
//! class = "point"
//! execution_mode = "real_time_thread"
//! scan_rate_hz = 1000.0
//! inputs = [{ device = "dio0", channels = [0, 1, 2] }]
//! outputs = [{ device = "dio0", channels = [0] }]
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

use daq_core::limits::{
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_NUMBER_OF_BUFFERS, DEFAULT_SAMPLES_PER_CHANNEL,
    LOCAL_CHASSIS_SENTINEL,
};
use serde::{Deserialize, Serialize};

use crate::device::DeviceIdentity;
use crate::error::{IomError, Result};
use crate::map::ExecutionMode;
use crate::transport::ChassisAddress;

/// Chassis address as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpSetting {
    /// Four octets; kept wide so out-of-range values are reported, not truncated
    Octets(Vec<i64>),
    /// The `"local"` sentinel
    Named(String),
}

/// Settings of one chassis connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Chassis address, mandatory
    pub ip: IpSetting,

    /// Chassis port, ignored for a local chassis
    #[serde(default)]
    pub port: Option<u16>,

    /// Timeout for the chassis open in milliseconds
    #[serde(default)]
    pub connection_timeout_ms: Option<u64>,

    /// Boards expected in the chassis
    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,

    /// Channel schedules over those boards
    #[serde(default)]
    pub maps: Vec<MapDefinition>,
}

impl ConnectionConfig {
    /// Parse `ip` and `port` into a chassis address.
    pub fn address(&self) -> Result<ChassisAddress> {
        match &self.ip {
            IpSetting::Named(name) if name.eq_ignore_ascii_case(LOCAL_CHASSIS_SENTINEL) => {
                Ok(ChassisAddress::Local)
            }
            IpSetting::Named(name) => Err(IomError::InvalidAddress {
                message: format!(
                    "'{}' is neither four octets nor \"{}\"",
                    name, LOCAL_CHASSIS_SENTINEL
                ),
            }),
            IpSetting::Octets(octets) => {
                let parsed: Vec<u8> = octets
                    .iter()
                    .map(|&o| u8::try_from(o))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|_| IomError::InvalidAddress {
                        message: format!("octets must be within 0..=255, got {:?}", octets),
                    })?;
                let &[a, b, c, d] = parsed.as_slice() else {
                    return Err(IomError::InvalidAddress {
                        message: format!("expected 4 octets, got {}", octets.len()),
                    });
                };
                let port = match self.port {
                    Some(port) if port != 0 => port,
                    _ => {
                        return Err(IomError::InvalidAddress {
                            message: "port is required for a remote chassis".into(),
                        })
                    }
                };
                Ok(ChassisAddress::Remote {
                    ip: Ipv4Addr::new(a, b, c, d),
                    port,
                })
            }
        }
    }

    /// Chassis open timeout, defaulted when unset.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONNECTION_TIMEOUT)
    }
}

/// One `[[devices]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Name maps reference
    pub name: String,

    /// Registry class (e.g. "dio-404")
    pub class: String,

    /// Chassis slot
    pub devn: u32,

    /// Records per acquisition buffer
    #[serde(default = "default_number_of_buffers")]
    pub number_of_buffers: u32,

    /// Samples per channel in one record
    #[serde(default = "default_samples_per_channel")]
    pub samples_per_channel: u32,

    /// Class-specific settings
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

impl DeviceDefinition {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            name: self.name.clone(),
            devn: self.devn,
            number_of_buffers: self.number_of_buffers,
            samples_per_channel: self.samples_per_channel,
        }
    }
}

/// One `[[maps]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDefinition {
    pub name: String,

    /// Registry class ("point" or "buffered")
    pub class: String,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Scan rate in hertz
    pub scan_rate_hz: f64,

    #[serde(default)]
    pub inputs: Vec<ChannelGroupDefinition>,

    #[serde(default)]
    pub outputs: Vec<ChannelGroupDefinition>,
}

/// Channels of one device used by a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroupDefinition {
    pub device: String,
    pub channels: Vec<u32>,
}

fn default_number_of_buffers() -> u32 {
    DEFAULT_NUMBER_OF_BUFFERS
}

fn default_samples_per_channel() -> u32 {
    DEFAULT_SAMPLES_PER_CHANNEL
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ConnectionConfig {
        toml::from_str(text).expect("valid toml")
    }

    #[test]
    fn test_remote_address() {
        let cfg = parse("ip = [192, 168, 100, 2]\nport = 6334");
        assert_eq!(
            cfg.address().expect("address"),
            ChassisAddress::Remote {
                ip: Ipv4Addr::new(192, 168, 100, 2),
                port: 6334
            }
        );
    }

    #[test]
    fn test_local_address_ignores_port() {
        assert_eq!(
            parse("ip = \"local\"").address().expect("local"),
            ChassisAddress::Local
        );
        assert_eq!(
            parse("ip = \"LOCAL\"\nport = 1").address().expect("local"),
            ChassisAddress::Local
        );
    }

    #[test]
    fn test_missing_ip_is_rejected() {
        let err = toml::from_str::<ConnectionConfig>("port = 6334").unwrap_err();
        assert!(err.to_string().contains("missing field `ip`"), "{err}");
    }

    #[test]
    fn test_invalid_addresses() {
        for text in [
            "ip = [192, 168, 100]\nport = 1",
            "ip = [192, 168, 100, 2, 1]\nport = 1",
            "ip = [256, 0, 0, 1]\nport = 1",
            "ip = [-1, 0, 0, 1]\nport = 1",
            "ip = [10, 0, 0, 1]",
            "ip = [10, 0, 0, 1]\nport = 0",
            "ip = \"chassis.lan\"",
        ] {
            assert!(
                matches!(parse(text).address(), Err(IomError::InvalidAddress { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn test_timeout_default() {
        assert_eq!(
            parse("ip = \"local\"").connection_timeout(),
            DEFAULT_CONNECTION_TIMEOUT
        );
        assert_eq!(
            parse("ip = \"local\"\nconnection_timeout_ms = 1500").connection_timeout(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_device_and_map_defaults() {
        let cfg = parse(
            r#"
            ip = "local"

            [[devices]]
            name = "dio0"
            class = "dio-404"
            devn = 3

            [[maps]]
            name = "slow"
            class = "point"
            scan_rate_hz = 10.0
            inputs = [{ device = "dio0", channels = [1, 2] }]
            "#,
        );
        let dev = &cfg.devices[0];
        assert_eq!(dev.number_of_buffers, DEFAULT_NUMBER_OF_BUFFERS);
        assert_eq!(dev.samples_per_channel, DEFAULT_SAMPLES_PER_CHANNEL);
        assert!(dev.config.as_table().is_some_and(|t| t.is_empty()));
        assert_eq!(dev.identity().devn, 3);

        let map = &cfg.maps[0];
        assert_eq!(map.execution_mode, ExecutionMode::RealTimeThread);
        assert!(map.outputs.is_empty());
        assert_eq!(map.inputs[0].channels, vec![1, 2]);
    }
}
