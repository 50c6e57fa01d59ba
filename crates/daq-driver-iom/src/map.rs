//! Channel schedules over one or more boards.
//!
//! A [`Map`] groups `(device, channels)` references per direction and binds
//! them to one execution context. The connection manager resolves device
//! names with [`Map::set_devices`], then runs [`Map::check_map_coherency`];
//! an incoherent map is never activated.
//!
//! Two classes ship with the registry:
//!
//! - `point`: one sample per channel per cycle.
//! - `buffered`: several samples per channel accumulate between cycles;
//!   every board must agree on the record length.

use std::collections::HashSet;

use daq_core::signal::{SignalDirection, SignalType};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{ChannelGroupDefinition, MapDefinition};
use crate::device::{ScanMode, SharedDevice};
use crate::error::{IomError, Result};
use crate::transport::{ChassisHandle, ChassisTransport, LayerSetting};

/// Context a map's consumer runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Driven by the periodic real-time thread
    #[default]
    RealTimeThread,
    /// Driven on demand by a non real-time caller
    Polled,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RealTimeThread => write!(f, "real_time_thread"),
            Self::Polled => write!(f, "polled"),
        }
    }
}

/// Channels of one board in one direction.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    pub device_name: String,
    pub direction: SignalDirection,
    pub channels: Vec<u32>,
    device: Option<SharedDevice>,
}

impl ChannelGroup {
    pub fn new(device_name: impl Into<String>, direction: SignalDirection, channels: Vec<u32>) -> Self {
        Self {
            device_name: device_name.into(),
            direction,
            channels,
            device: None,
        }
    }

    fn from_definition(def: &ChannelGroupDefinition, direction: SignalDirection) -> Self {
        Self::new(def.device.clone(), direction, def.channels.clone())
    }

    /// Board bound by [`Map::set_devices`].
    pub fn device(&self) -> Option<&SharedDevice> {
        self.device.as_ref()
    }
}

/// Values of one channel over one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelValues {
    pub device: String,
    pub channel: u32,
    pub samples: Vec<bool>,
}

/// State every map class shares.
#[derive(Debug)]
pub struct MapCore {
    name: String,
    execution_mode: ExecutionMode,
    scan_rate_hz: f64,
    groups: Vec<ChannelGroup>,
    coherent: bool,
    active: bool,
}

impl MapCore {
    pub fn new(
        name: impl Into<String>,
        execution_mode: ExecutionMode,
        scan_rate_hz: f64,
        groups: Vec<ChannelGroup>,
    ) -> Self {
        Self {
            name: name.into(),
            execution_mode,
            scan_rate_hz,
            groups,
            coherent: false,
            active: false,
        }
    }

    pub fn from_definition(def: &MapDefinition) -> Self {
        let groups = def
            .inputs
            .iter()
            .map(|g| ChannelGroup::from_definition(g, SignalDirection::Input))
            .chain(
                def.outputs
                    .iter()
                    .map(|g| ChannelGroup::from_definition(g, SignalDirection::Output)),
            )
            .collect();
        Self::new(def.name.clone(), def.execution_mode, def.scan_rate_hz, groups)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn scan_rate_hz(&self) -> f64 {
        self.scan_rate_hz
    }

    pub fn groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Bound boards, each once, in group order.
    pub fn bound_devices(&self) -> Vec<SharedDevice> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .filter_map(|g| g.device.clone())
            .filter(|d| seen.insert(std::sync::Arc::as_ptr(d).cast::<()>()))
            .collect()
    }

    /// Rules shared by every class; the reason text on failure.
    fn check_common_rules(&self) -> std::result::Result<(), String> {
        if self.groups.is_empty() {
            return Err("map has no channel groups".into());
        }
        if !self.scan_rate_hz.is_finite() || self.scan_rate_hz <= 0.0 {
            return Err(format!("scan rate {} Hz is not positive", self.scan_rate_hz));
        }

        let mut claimed = HashSet::new();
        let mut sample_size = None;
        for group in &self.groups {
            let Some(device) = &group.device else {
                return Err(format!("device '{}' is not bound", group.device_name));
            };
            if !claimed.insert((group.device_name.as_str(), group.direction)) {
                return Err(format!(
                    "device '{}' appears twice as {}",
                    group.device_name, group.direction
                ));
            }
            if group.channels.is_empty() {
                return Err(format!(
                    "no {} channels listed for '{}'",
                    group.direction, group.device_name
                ));
            }

            let device = device.lock();
            let mut channels = HashSet::new();
            for &channel in &group.channels {
                if !device.check_channel_and_direction(channel, group.direction) {
                    return Err(format!(
                        "channel {} is not a valid {} channel of '{}'",
                        channel, group.direction, group.device_name
                    ));
                }
                if !channels.insert(channel) {
                    return Err(format!(
                        "channel {} of '{}' listed twice",
                        channel, group.device_name
                    ));
                }
            }
            match sample_size {
                None => sample_size = Some(device.sample_size()),
                Some(size) if size != device.sample_size() => {
                    return Err(format!(
                        "'{}' uses {}-byte samples, other devices use {}",
                        group.device_name,
                        device.sample_size(),
                        size
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// A channel schedule bound to one execution context.
pub trait Map: Send + std::fmt::Debug {
    fn core(&self) -> &MapCore;

    fn core_mut(&mut self) -> &mut MapCore;

    /// Registry class this map was built from.
    fn class_name(&self) -> &'static str;

    /// Scan mode pushed into the hardware channel lists.
    fn scan_mode(&self) -> ScanMode;

    /// Class-specific coherency rules, run after the shared ones.
    fn check_class_rules(&self) -> std::result::Result<(), String>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn execution_mode(&self) -> ExecutionMode {
        self.core().execution_mode()
    }

    fn groups(&self) -> &[ChannelGroup] {
        self.core().groups()
    }

    fn is_coherent(&self) -> bool {
        self.core().coherent
    }

    fn is_active(&self) -> bool {
        self.core().active
    }

    /// Bind every group to the board of the same name.
    ///
    /// Nothing is bound if any name fails to resolve.
    fn set_devices(&mut self, devices: &[SharedDevice]) -> Result<()> {
        let mut resolved = Vec::with_capacity(self.groups().len());
        for group in self.groups() {
            let device = devices
                .iter()
                .find(|d| d.lock().name() == group.device_name)
                .ok_or_else(|| IomError::UnresolvedDevice {
                    map: self.name().to_string(),
                    device: group.device_name.clone(),
                })?;
            resolved.push(device.clone());
        }

        let core = self.core_mut();
        for (group, device) in core.groups.iter_mut().zip(resolved) {
            group.device = Some(device);
        }
        core.coherent = false;
        Ok(())
    }

    /// Validate the bound schedule; records the outcome in
    /// [`is_coherent`](Self::is_coherent).
    fn check_map_coherency(&mut self) -> Result<()> {
        let outcome = self
            .core()
            .check_common_rules()
            .and_then(|()| self.check_class_rules());
        let coherent = outcome.is_ok();
        self.core_mut().coherent = coherent;
        outcome.map_err(|reason| IomError::IncoherentMap {
            map: self.name().to_string(),
            reason,
        })
    }

    /// Register the channels on each board and push the hardware channel lists.
    fn activate(&mut self, transport: &mut dyn ChassisTransport, handle: ChassisHandle) -> Result<()> {
        if !self.is_coherent() {
            return Err(IomError::state(format!(
                "map '{}' has not passed its coherency check",
                self.name()
            )));
        }
        let mode = self.scan_mode();
        for group in self.groups() {
            let Some(device) = &group.device else {
                continue;
            };
            let mut device = device.lock();
            device.set_channels(group.direction, &group.channels)?;
            let entries = device.configure_channels(group.direction, mode)?;
            transport.write_layer_setting(
                handle,
                device.devn(),
                &LayerSetting::ChannelList {
                    direction: group.direction,
                    entries,
                },
            )?;
            device.reset_buffer(group.direction);
            debug!(
                map = %self.name(),
                devn = device.devn(),
                direction = %group.direction,
                channels = ?group.channels,
                "Configured channel list"
            );
        }
        self.core_mut().active = true;
        Ok(())
    }

    /// Consumer side of one cycle for the input groups.
    ///
    /// Every board holding a full record yields one [`ChannelValues`] per
    /// listed channel and then has its input buffer checked out. Boards
    /// without a full record are skipped.
    fn read_inputs(&self) -> Result<Vec<ChannelValues>> {
        let mut values = Vec::new();
        for group in self.groups().iter().filter(|g| g.direction == SignalDirection::Input) {
            let Some(device) = &group.device else {
                continue;
            };
            let mut device = device.lock();
            if !device.input_buffer().check_read_ready() {
                trace!(map = %self.name(), device = %group.device_name, "No full input record");
                continue;
            }
            let n = device.samples_per_channel();
            let mut raw = vec![0u8; n as usize];
            for &channel in &group.channels {
                device.retrieve_input_signal(channel, n, &mut raw, SignalType::Bool)?;
                values.push(ChannelValues {
                    device: group.device_name.clone(),
                    channel,
                    samples: raw.iter().map(|&b| b != 0).collect(),
                });
            }
            device.input_buffer_mut().checkout_buffer();
        }
        Ok(values)
    }

    /// Stage and commit one output record per board from `values`.
    ///
    /// Channels of the map missing from `values` are driven low.
    fn write_outputs(&self, values: &[ChannelValues]) -> Result<()> {
        for group in self.groups().iter().filter(|g| g.direction == SignalDirection::Output) {
            let Some(device) = &group.device else {
                continue;
            };
            let mut device = device.lock();
            let n = device.samples_per_channel();
            let low = vec![0u8; n as usize];
            for &channel in &group.channels {
                let staged = values
                    .iter()
                    .find(|v| v.device == group.device_name && v.channel == channel)
                    .map(|v| v.samples.iter().map(|&s| u8::from(s)).collect::<Vec<_>>());
                let source = staged.as_deref().unwrap_or(&low);
                device.set_output_signal(channel, n, source, SignalType::Bool)?;
            }
            device.flush_output_signals()?;
        }
        Ok(())
    }
}

/// One sample per channel per cycle.
#[derive(Debug)]
pub struct PointMap {
    core: MapCore,
}

impl PointMap {
    pub const CLASS: &'static str = "point";

    pub fn new(core: MapCore) -> Self {
        Self { core }
    }
}

impl Map for PointMap {
    fn core(&self) -> &MapCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MapCore {
        &mut self.core
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn scan_mode(&self) -> ScanMode {
        ScanMode::PointByPoint
    }

    fn check_class_rules(&self) -> std::result::Result<(), String> {
        for group in self.groups() {
            if let Some(device) = group.device() {
                let samples = device.lock().samples_per_channel();
                if samples != 1 {
                    return Err(format!(
                        "point map needs 1 sample per channel, '{}' has {}",
                        group.device_name, samples
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Several samples per channel accumulate between consumer cycles.
#[derive(Debug)]
pub struct BufferedMap {
    core: MapCore,
}

impl BufferedMap {
    pub const CLASS: &'static str = "buffered";

    pub fn new(core: MapCore) -> Self {
        Self { core }
    }
}

impl Map for BufferedMap {
    fn core(&self) -> &MapCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MapCore {
        &mut self.core
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn scan_mode(&self) -> ScanMode {
        ScanMode::Buffered
    }

    fn check_class_rules(&self) -> std::result::Result<(), String> {
        let mut common = None;
        for group in self.groups() {
            let Some(device) = group.device() else {
                continue;
            };
            let device = device.lock();
            let samples = device.samples_per_channel();
            match common {
                None => common = Some(samples),
                Some(expected) if expected != samples => {
                    return Err(format!(
                        "'{}' records {} samples per channel, other devices record {}",
                        group.device_name, samples, expected
                    ));
                }
                Some(_) => {}
            }
            if self.execution_mode() == ExecutionMode::RealTimeThread
                && device.number_of_buffers() < 2
            {
                return Err(format!(
                    "'{}' needs at least 2 buffers for the real-time thread, has {}",
                    group.device_name,
                    device.number_of_buffers()
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::device::{Device, DeviceIdentity};
    use crate::digital_io::{DigitalIoConfig, DigitalIoDevice};
    use crate::word::HardwareWord;

    fn dio(name: &str, devn: u32, buffers: u32, samples: u32) -> SharedDevice {
        let mut device = DigitalIoDevice::new(
            DeviceIdentity {
                name: name.into(),
                devn,
                number_of_buffers: buffers,
                samples_per_channel: samples,
            },
            DigitalIoConfig {
                voltage_reference: 24.0,
                lower_hysteresis: None,
                upper_hysteresis: None,
            },
        )
        .expect("device");
        device
            .core_mut()
            .allocate_buffers(1, 1, HardwareWord::SIZE)
            .expect("allocate");
        Arc::new(Mutex::new(device))
    }

    fn core(groups: Vec<ChannelGroup>) -> MapCore {
        MapCore::new("m", ExecutionMode::RealTimeThread, 100.0, groups)
    }

    fn input(device: &str, channels: &[u32]) -> ChannelGroup {
        ChannelGroup::new(device, SignalDirection::Input, channels.to_vec())
    }

    fn output(device: &str, channels: &[u32]) -> ChannelGroup {
        ChannelGroup::new(device, SignalDirection::Output, channels.to_vec())
    }

    fn reason(map: &mut dyn Map) -> String {
        match map.check_map_coherency() {
            Err(IomError::IncoherentMap { reason, .. }) => reason,
            other => panic!("expected incoherent map, got {other:?}"),
        }
    }

    #[test]
    fn test_set_devices_unresolved_name() {
        let devices = vec![dio("a", 0, 2, 1)];
        let mut map = PointMap::new(core(vec![input("a", &[0]), input("ghost", &[1])]));
        let err = map.set_devices(&devices).unwrap_err();
        assert!(matches!(
            err,
            IomError::UnresolvedDevice { ref device, .. } if device == "ghost"
        ));
        assert!(map.groups().iter().all(|g| g.device().is_none()));
    }

    #[test]
    fn test_coherent_point_map() {
        let devices = vec![dio("a", 0, 2, 1), dio("b", 1, 2, 1)];
        let mut map = PointMap::new(core(vec![
            input("a", &[0, 1, 11]),
            output("a", &[0]),
            input("b", &[3]),
        ]));
        map.set_devices(&devices).expect("resolve");
        map.check_map_coherency().expect("coherent");
        assert!(map.is_coherent());
        assert_eq!(map.core().bound_devices().len(), 2);
    }

    #[test]
    fn test_common_rules() {
        let devices = vec![dio("a", 0, 2, 1)];

        let mut empty = PointMap::new(core(vec![]));
        assert!(reason(&mut empty).contains("no channel groups"));

        let mut unbound = PointMap::new(core(vec![input("a", &[0])]));
        assert!(reason(&mut unbound).contains("not bound"));

        let cases: Vec<(Vec<ChannelGroup>, &str)> = vec![
            (vec![input("a", &[12])], "not a valid input channel"),
            (vec![input("a", &[2, 2])], "listed twice"),
            (vec![input("a", &[0]), input("a", &[1])], "appears twice"),
            (vec![output("a", &[])], "no output channels"),
        ];
        for (groups, expected) in cases {
            let mut map = PointMap::new(core(groups));
            map.set_devices(&devices).expect("resolve");
            let text = reason(&mut map);
            assert!(text.contains(expected), "{text}");
            assert!(!map.is_coherent());
        }

        let mut bad_rate = PointMap::new(MapCore::new(
            "r",
            ExecutionMode::Polled,
            f64::NAN,
            vec![input("a", &[0])],
        ));
        bad_rate.set_devices(&devices).expect("resolve");
        assert!(reason(&mut bad_rate).contains("scan rate"));
    }

    #[test]
    fn test_point_map_requires_single_sample() {
        let devices = vec![dio("a", 0, 2, 4)];
        let mut map = PointMap::new(core(vec![input("a", &[0])]));
        map.set_devices(&devices).expect("resolve");
        assert!(reason(&mut map).contains("1 sample per channel"));
    }

    #[test]
    fn test_buffered_map_rules() {
        let devices = vec![dio("a", 0, 2, 8), dio("b", 1, 2, 4), dio("c", 2, 1, 8)];

        let mut mixed = BufferedMap::new(core(vec![input("a", &[0]), input("b", &[0])]));
        mixed.set_devices(&devices).expect("resolve");
        assert!(reason(&mut mixed).contains("samples per channel"));

        let mut single = BufferedMap::new(core(vec![input("c", &[0])]));
        single.set_devices(&devices).expect("resolve");
        assert!(reason(&mut single).contains("at least 2 buffers"));

        let mut polled = BufferedMap::new(MapCore::new(
            "p",
            ExecutionMode::Polled,
            10.0,
            vec![input("a", &[0]), input("c", &[1])],
        ));
        polled.set_devices(&devices).expect("resolve");
        polled.check_map_coherency().expect("polled map may single-buffer");
    }

    #[test]
    fn test_read_inputs_and_checkout() {
        let devices = vec![dio("a", 0, 2, 2)];
        let mut map = BufferedMap::new(core(vec![input("a", &[0, 2])]));
        map.set_devices(&devices).expect("resolve");
        map.check_map_coherency().expect("coherent");

        assert!(map.read_inputs().expect("nothing yet").is_empty());

        let words: Vec<u8> = [0b101u32, 0b001]
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect();
        devices[0]
            .lock()
            .input_buffer_mut()
            .write_bytes(&words)
            .expect("write");

        let values = map.read_inputs().expect("read");
        assert_eq!(
            values,
            vec![
                ChannelValues {
                    device: "a".into(),
                    channel: 0,
                    samples: vec![true, true]
                },
                ChannelValues {
                    device: "a".into(),
                    channel: 2,
                    samples: vec![true, false]
                },
            ]
        );
        assert_eq!(devices[0].lock().input_buffer().committed_bytes(), 0);
    }

    #[test]
    fn test_write_outputs_drives_missing_channels_low() {
        let devices = vec![dio("a", 0, 2, 1)];
        let mut map = PointMap::new(core(vec![output("a", &[1, 4])]));
        map.set_devices(&devices).expect("resolve");
        map.write_outputs(&[ChannelValues {
            device: "a".into(),
            channel: 4,
            samples: vec![true],
        }])
        .expect("write");

        let device = devices[0].lock();
        let bytes = device.output_buffer().peek(4).expect("committed");
        assert_eq!(HardwareWord::read_from(bytes), Some(HardwareWord::new(0b1_0000)));
    }
}
