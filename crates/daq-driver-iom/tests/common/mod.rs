//! Shared fixtures for the chassis integration tests.
//!
//! Besides configuration builders this registers two extra classes:
//!
//! - `ai-217`: an 8-channel input-only board reporting model `0x217`, one
//!   hardware word per channel
//! - `incoherent`: a map class whose coherency check always fails

#![allow(dead_code)]

use std::sync::Arc;

use daq_core::signal::{SignalDirection, SignalType};
use daq_driver_iom::{
    ChannelListEntry, ChassisHandle, ChassisTransport, ConnectionConfig, Device, DeviceCore,
    DeviceDefinition, DeviceFactory, DriverRegistry, IomError, Map, MapCore, MapDefinition,
    MapFactory, ModelCode, Result, SampleCursor, ScanMode, SharedDevice,
};
use parking_lot::Mutex;

pub const DIO_MODEL: ModelCode = ModelCode(0x404);
pub const AI_MODEL: ModelCode = ModelCode(0x217);

// =============================================================================
// Input-only board
// =============================================================================

#[derive(Debug)]
pub struct AnalogInputStub {
    core: DeviceCore,
}

impl Device for AnalogInputStub {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn class_name(&self) -> &'static str {
        "ai-217"
    }

    fn model(&self) -> ModelCode {
        AI_MODEL
    }

    fn channel_count(&self, direction: SignalDirection) -> u32 {
        match direction {
            SignalDirection::Input => 8,
            _ => 0,
        }
    }

    fn words_per_scan(&self, direction: SignalDirection) -> u32 {
        self.channel_count(direction)
    }

    fn accepted_signal_type(&self, signal_type: SignalType) -> bool {
        signal_type == SignalType::Float64
    }

    fn configure_channels(
        &self,
        direction: SignalDirection,
        mode: ScanMode,
    ) -> Result<Vec<ChannelListEntry>> {
        let channels = self.requested_channels(direction);
        if direction != SignalDirection::Input || channels.is_empty() {
            return Err(IomError::NoChannelsRequested {
                devn: self.devn(),
                direction,
            });
        }
        Ok(channels
            .iter()
            .map(|&c| ChannelListEntry::new(c as u8, 1, mode))
            .collect())
    }

    fn scale_signal(
        &self,
        channel: u32,
        n_samples: u32,
        source: &mut SampleCursor<'_>,
        destination: &mut [u8],
        _dest_type: SignalType,
    ) -> Result<()> {
        for (i, word) in source.skip(channel as usize).step_by(8).take(n_samples as usize).enumerate() {
            destination[i * 8..(i + 1) * 8].copy_from_slice(&f64::from(word.raw()).to_ne_bytes());
        }
        Ok(())
    }

    fn set_output_signal(
        &mut self,
        channel: u32,
        _n_samples: u32,
        _source: &[u8],
        _src_type: SignalType,
    ) -> Result<()> {
        Err(IomError::InvalidChannel {
            devn: self.devn(),
            channel,
            direction: SignalDirection::Output,
            max: 0,
        })
    }

    fn configure_device(
        &mut self,
        _transport: &mut dyn ChassisTransport,
        _handle: ChassisHandle,
    ) -> Result<()> {
        let sample_size = self.sample_size();
        self.core.allocate_buffers(8, 0, sample_size)
    }
}

pub struct AnalogInputStubFactory;

impl DeviceFactory for AnalogInputStubFactory {
    fn class(&self) -> &'static str {
        "ai-217"
    }

    fn model(&self) -> ModelCode {
        AI_MODEL
    }

    fn validate(&self, _definition: &DeviceDefinition) -> Result<()> {
        Ok(())
    }

    fn build(&self, definition: &DeviceDefinition) -> Result<SharedDevice> {
        Ok(Arc::new(Mutex::new(AnalogInputStub {
            core: DeviceCore::new(definition.identity()),
        })))
    }
}

// =============================================================================
// Map that never passes its coherency check
// =============================================================================

#[derive(Debug)]
pub struct IncoherentMap {
    core: MapCore,
}

impl Map for IncoherentMap {
    fn core(&self) -> &MapCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut MapCore {
        &mut self.core
    }

    fn class_name(&self) -> &'static str {
        "incoherent"
    }

    fn scan_mode(&self) -> ScanMode {
        ScanMode::PointByPoint
    }

    fn check_class_rules(&self) -> std::result::Result<(), String> {
        Err("forced failure".into())
    }
}

pub struct IncoherentMapFactory;

impl MapFactory for IncoherentMapFactory {
    fn class(&self) -> &'static str {
        "incoherent"
    }

    fn build(&self, definition: &MapDefinition) -> Result<Box<dyn Map>> {
        Ok(Box::new(IncoherentMap {
            core: MapCore::from_definition(definition),
        }))
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Default registry plus the test-only classes.
pub fn registry() -> DriverRegistry {
    let mut registry = DriverRegistry::with_defaults();
    registry.register_device_factory(Box::new(AnalogInputStubFactory));
    registry.register_map_factory(Box::new(IncoherentMapFactory));
    registry
}

/// `[[devices]]` entry for a digital board.
pub fn dio(name: &str, devn: u32) -> String {
    format!(
        r#"
[[devices]]
name = "{name}"
class = "dio-404"
devn = {devn}
[devices.config]
voltage_reference = 24.0
"#
    )
}

/// `[[devices]]` entry for the input-only stub board.
pub fn ai(name: &str, devn: u32) -> String {
    format!(
        r#"
[[devices]]
name = "{name}"
class = "ai-217"
devn = {devn}
"#
    )
}

/// Local connection with the given device and map entries.
pub fn local_config(entries: &[String]) -> ConnectionConfig {
    let text = format!("ip = \"local\"\n{}", entries.concat());
    toml::from_str(&text).expect("valid connection config")
}
