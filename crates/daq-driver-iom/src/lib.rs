//! Driver for chassis-based remote I/O systems.
//!
//! A chassis holds up to twelve plug-in boards, each addressed by its slot
//! number (`devn`). This crate enumerates and configures those boards over an
//! injected [`ChassisTransport`] and moves scan data between the chassis and a
//! periodic consumer.
//!
//! # Architecture
//!
//! - [`AcquisitionBuffer`] - bounded byte buffer between scan path and consumer
//! - [`HardwareWord`] / [`SampleCursor`] - raw 32-bit samples
//! - [`Device`] - board contract; [`DigitalIoDevice`] is the 12-in / 12-out
//!   digital board
//! - [`Map`] - channel schedule over several boards ([`PointMap`],
//!   [`BufferedMap`])
//! - [`DriverRegistry`] - class-string keyed device and map factories
//! - [`ConnectionManager`] - connection state machine
//! - [`SimulatedChassis`] - in-process [`ChassisTransport`]
//!
//! # Example
//!
//! ```no_run
//! use daq_driver_iom::{ConnectionConfig, ConnectionManager, DriverRegistry, SimulatedChassis};
//!
//! # fn example(text: &str) -> anyhow::Result<()> {
//! let config: ConnectionConfig = toml::from_str(text)?;
//! let mut manager = ConnectionManager::new(Box::new(SimulatedChassis::new()));
//! manager.initialise(&config, &DriverRegistry::with_defaults())?;
//! manager.activate_map("fast")?;
//! let report = manager.run_cycle("fast")?;
//! println!("read {} records", report.records_read);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod device;
pub mod digital_io;
pub mod error;
pub mod factory;
pub mod map;
pub mod simulator;
pub mod transport;
pub mod word;

pub use buffer::AcquisitionBuffer;
pub use config::{ChannelGroupDefinition, ConnectionConfig, DeviceDefinition, IpSetting, MapDefinition};
pub use connection::{ConnectionManager, CycleReport, ManagerState};
pub use device::{ChannelListEntry, Device, DeviceCore, DeviceIdentity, ModelCode, ScanMode, SharedDevice};
pub use digital_io::{DigitalIoConfig, DigitalIoDevice, DIO_404_MODEL};
pub use error::{IomError, IomErrorKind, Result};
pub use factory::{DeviceFactory, DriverRegistry, MapFactory};
pub use map::{BufferedMap, ChannelGroup, ChannelValues, ExecutionMode, Map, MapCore, PointMap};
pub use simulator::{FaultScenario, SimulatedChassis, SimulatedSlot, SimulatorConfig};
pub use transport::{ChassisAddress, ChassisHandle, ChassisTransport, LayerSetting, TransportError};
pub use word::{HardwareWord, SampleCursor};
