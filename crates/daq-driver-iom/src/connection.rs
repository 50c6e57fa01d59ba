//! Master connection manager.
//!
//! Drives one chassis connection through its configuration sequence:
//!
//! ```text
//! Unconnected ─► Connected ─► DevicesEnumerated ─► DevicesConfigured ─► MapsConfigured ─► Ready
//!      │             │                │                    │                   │
//!      └─────────────┴────────────────┴────────────────────┴───────────────────┴──► Failed
//! ```
//!
//! Any failure tears down what was built so far (maps, devices, chassis
//! handle, library) and leaves the manager in [`ManagerState::Failed`]; a new
//! manager is needed to try again. Only a `Ready` manager activates maps and
//! runs acquisition cycles.

use std::collections::{HashMap, HashSet};

use daq_core::limits::MAX_DEVICES_PER_CONNECTION;
use daq_core::signal::SignalDirection;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::device::SharedDevice;
use crate::error::{IomError, Result};
use crate::factory::DriverRegistry;
use crate::map::Map;
use crate::transport::{ChassisAddress, ChassisHandle, ChassisTransport};

/// Lifecycle state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Unconnected,
    Connected,
    DevicesEnumerated,
    DevicesConfigured,
    MapsConfigured,
    Ready,
    Failed,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::DevicesEnumerated => "devices_enumerated",
            Self::DevicesConfigured => "devices_configured",
            Self::MapsConfigured => "maps_configured",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Traffic moved by one [`ConnectionManager::run_cycle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Input records read from the chassis
    pub records_read: usize,
    /// Output records sent to the chassis
    pub records_written: usize,
    /// Input records skipped because the consumer had not checked out
    pub overruns: usize,
}

/// Owner of one chassis connection and everything built on it.
pub struct ConnectionManager {
    transport: Box<dyn ChassisTransport>,
    state: ManagerState,
    library_open: bool,
    address: Option<ChassisAddress>,
    handle: Option<ChassisHandle>,
    devices: Vec<SharedDevice>,
    maps: Vec<Box<dyn Map>>,
}

impl ConnectionManager {
    pub fn new(transport: Box<dyn ChassisTransport>) -> Self {
        Self {
            transport,
            state: ManagerState::Unconnected,
            library_open: false,
            address: None,
            handle: None,
            devices: Vec::new(),
            maps: Vec::new(),
        }
    }

    /// Run the full configuration sequence up to `Ready`.
    pub fn initialise(&mut self, config: &ConnectionConfig, registry: &DriverRegistry) -> Result<()> {
        if self.state != ManagerState::Unconnected {
            return Err(IomError::state(format!(
                "initialise requires an unconnected manager, state is {}",
                self.state
            )));
        }

        let result = self.run_sequence(config, registry);
        if let Err(err) = &result {
            warn!(state = %self.state, error = %err, "Chassis initialisation failed");
            let _ = self.teardown();
            self.state = ManagerState::Failed;
        }
        result
    }

    fn run_sequence(&mut self, config: &ConnectionConfig, registry: &DriverRegistry) -> Result<()> {
        self.connect(config)?;
        self.state = ManagerState::Connected;

        self.enumerate_devices(config, registry)?;
        self.state = ManagerState::DevicesEnumerated;

        self.configure_devices()?;
        self.state = ManagerState::DevicesConfigured;

        self.configure_maps(config, registry)?;
        self.state = ManagerState::MapsConfigured;

        self.state = ManagerState::Ready;
        info!(
            devices = self.devices.len(),
            maps = self.maps.len(),
            "Chassis connection ready"
        );
        Ok(())
    }

    fn connect(&mut self, config: &ConnectionConfig) -> Result<()> {
        let address = config.address()?;
        let timeout = config.connection_timeout();

        self.transport.open_library()?;
        self.library_open = true;

        let raw = self.transport.open_chassis(&address, timeout)?;
        let handle = ChassisHandle::new(raw).ok_or(IomError::InvalidHandle)?;
        self.handle = Some(handle);
        self.address = Some(address);
        info!(%address, handle = handle.get(), ?timeout, "Opened chassis");
        Ok(())
    }

    fn enumerate_devices(&mut self, config: &ConnectionConfig, registry: &DriverRegistry) -> Result<()> {
        let handle = self.require_handle()?;
        let definitions = &config.devices;
        if definitions.is_empty() {
            return Err(IomError::NoDevices);
        }
        if definitions.len() > MAX_DEVICES_PER_CONNECTION {
            return Err(IomError::TooManyDevices {
                count: definitions.len(),
                max: MAX_DEVICES_PER_CONNECTION,
            });
        }

        let mut slots: HashMap<u32, &str> = HashMap::new();
        let mut names = HashSet::new();
        for def in definitions {
            if let Some(first) = slots.insert(def.devn, &def.name) {
                return Err(IomError::DuplicateDevn {
                    devn: def.devn,
                    first: first.to_string(),
                    second: def.name.clone(),
                });
            }
            if !names.insert(def.name.as_str()) {
                return Err(IomError::DuplicateName {
                    name: def.name.clone(),
                });
            }
        }

        for def in definitions {
            let device = registry.build_device(def)?;
            let expected = device.lock().model();
            match self.transport.installed_model(handle, def.devn)? {
                None => return Err(IomError::MissingHardware { devn: def.devn }),
                Some(installed) if installed != expected => {
                    return Err(IomError::ModelMismatch {
                        devn: def.devn,
                        expected: expected.0,
                        installed: installed.0,
                    });
                }
                Some(_) => {}
            }
            debug!(name = %def.name, devn = def.devn, model = %expected, "Enumerated device");
            self.devices.push(device);
        }
        Ok(())
    }

    fn configure_devices(&mut self) -> Result<()> {
        let handle = self.require_handle()?;
        for device in &self.devices {
            device
                .lock()
                .configure_device(self.transport.as_mut(), handle)?;
        }
        Ok(())
    }

    fn configure_maps(&mut self, config: &ConnectionConfig, registry: &DriverRegistry) -> Result<()> {
        let mut owners: HashMap<(String, SignalDirection), String> = HashMap::new();
        for def in &config.maps {
            if self.maps.iter().any(|m| m.name() == def.name) {
                return Err(IomError::config(format!("map '{}' is declared twice", def.name)));
            }

            let mut map = registry.build_map(def)?;
            map.set_devices(&self.devices)?;
            map.check_map_coherency()?;

            for group in map.groups() {
                let key = (group.device_name.clone(), group.direction);
                if let Some(owner) = owners.get(&key) {
                    return Err(IomError::IncoherentMap {
                        map: def.name.clone(),
                        reason: format!(
                            "{} of '{}' is already driven by map '{}'",
                            group.direction, group.device_name, owner
                        ),
                    });
                }
                owners.insert(key, def.name.clone());
            }

            debug!(
                map = %def.name,
                class = map.class_name(),
                mode = %map.execution_mode(),
                "Configured map"
            );
            self.maps.push(map);
        }
        Ok(())
    }

    fn require_handle(&self) -> Result<ChassisHandle> {
        self.handle.ok_or(IomError::InvalidHandle)
    }

    fn require_ready(&self, operation: &str) -> Result<ChassisHandle> {
        if self.state != ManagerState::Ready {
            return Err(IomError::state(format!(
                "{} requires a ready manager, state is {}",
                operation, self.state
            )));
        }
        self.require_handle()
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn handle(&self) -> Option<ChassisHandle> {
        self.handle
    }

    pub fn address(&self) -> Option<ChassisAddress> {
        self.address
    }

    /// Boards in enumeration order.
    pub fn devices(&self) -> &[SharedDevice] {
        &self.devices
    }

    pub fn device(&self, name: &str) -> Option<SharedDevice> {
        self.devices.iter().find(|d| d.lock().name() == name).cloned()
    }

    pub fn maps(&self) -> &[Box<dyn Map>] {
        &self.maps
    }

    pub fn map(&self, name: &str) -> Option<&dyn Map> {
        self.maps.iter().find(|m| m.name() == name).map(|m| m.as_ref())
    }

    /// Push the channel lists of map `name` to the chassis.
    pub fn activate_map(&mut self, name: &str) -> Result<()> {
        let handle = self.require_ready("activate_map")?;
        let Self { transport, maps, .. } = self;
        let map = maps
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| IomError::config(format!("unknown map '{}'", name)))?;
        map.activate(transport.as_mut(), handle)?;
        info!(map = %name, "Activated map");
        Ok(())
    }

    /// Producer side of one acquisition cycle for map `name`.
    ///
    /// Reads one record from the chassis into the input buffer of every
    /// input board and sends every committed output record of every output
    /// board. A board whose input buffer is full is skipped and counted as
    /// an overrun.
    pub fn run_cycle(&mut self, name: &str) -> Result<CycleReport> {
        let handle = self.require_ready("run_cycle")?;
        let Self { transport, maps, .. } = self;
        let map = maps
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| IomError::config(format!("unknown map '{}'", name)))?;
        if !map.is_active() {
            return Err(IomError::state(format!("map '{}' is not active", name)));
        }

        let mut report = CycleReport::default();
        for group in map.groups() {
            let Some(device) = group.device() else {
                continue;
            };
            let mut device = device.lock();
            let devn = device.devn();
            let record = device.record_size(group.direction);
            match group.direction {
                SignalDirection::Input => {
                    if !device.input_buffer().check_available_space(record) {
                        warn!(map = %name, devn, "Input buffer full, scan dropped");
                        report.overruns += 1;
                        continue;
                    }
                    let region = device.input_buffer_mut().write_region(record)?;
                    transport.read_scan(handle, devn, region)?;
                    device.input_buffer_mut().advance_buffer_index(record)?;
                    report.records_read += 1;
                }
                SignalDirection::Output => {
                    let buffer = device.output_buffer();
                    let records = buffer.unread_bytes() / record.max(1);
                    if records == 0 {
                        continue;
                    }
                    let committed = buffer.peek(records * record)?;
                    for chunk in committed.chunks_exact(record) {
                        transport.write_scan(handle, devn, chunk)?;
                    }
                    device.output_buffer_mut().checkout_buffer();
                    report.records_written += records;
                }
                SignalDirection::None => {}
            }
        }
        trace!(map = %name, ?report, "Cycle complete");
        Ok(report)
    }

    /// Close everything; the manager returns to `Unconnected`.
    pub fn shutdown(&mut self) -> Result<()> {
        let result = self.teardown();
        self.state = ManagerState::Unconnected;
        info!("Chassis connection shut down");
        result
    }

    fn teardown(&mut self) -> Result<()> {
        self.maps.clear();
        self.devices.clear();
        self.address = None;

        let mut result = Ok(());
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.transport.close_chassis(handle) {
                warn!(handle = handle.get(), error = %err, "Failed to close chassis");
                result = Err(err.into());
            }
        }
        if self.library_open {
            self.transport.close_library();
            self.library_open = false;
        }
        result
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("address", &self.address)
            .field("handle", &self.handle)
            .field("devices", &self.devices.len())
            .field("maps", &self.maps.len())
            .finish()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.handle.is_some() || self.library_open {
            let _ = self.teardown();
        }
    }
}
