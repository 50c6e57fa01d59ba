//! 12-input / 12-output digital board.
//!
//! Every logical channel is one bit of the 32-bit hardware word of its
//! direction: input channel `n` is bit `n` of the input word, output channel
//! `n` is bit `n` of the output word. A scan therefore occupies exactly one
//! word per direction.
//!
//! Board settings come from the device's `config` table:
//!
//! ```toml
//! [devices.config]
//! voltage_reference = 24.0
//! lower_hysteresis = 6.0   # optional, together with upper_hysteresis
//! upper_hysteresis = 12.0
//! ```

use daq_core::signal::{SignalDirection, SignalType};
use serde::Deserialize;
use tracing::debug;

use crate::device::{
    ChannelListEntry, Device, DeviceCore, DeviceIdentity, ModelCode, ScanMode,
};
use crate::error::{IomError, Result};
use crate::transport::{ChassisHandle, ChassisTransport, LayerSetting};
use crate::word::{HardwareWord, SampleCursor};

/// Model code the chassis reports for the digital board.
pub const DIO_404_MODEL: ModelCode = ModelCode(0x404);

/// Logical channels per direction.
pub const DIO_404_CHANNELS: u32 = 12;

/// Logic reference voltages the board can be set to.
pub const SUPPORTED_REFERENCE_VOLTAGES: &[f64] = &[3.3, 5.0, 12.0, 24.0];

/// Settings of one digital board.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DigitalIoConfig {
    /// Logic reference voltage in volts
    #[serde(alias = "VoltageReference")]
    pub voltage_reference: f64,

    /// Lower hysteresis threshold in volts
    #[serde(default, alias = "LowerHysteresys")]
    pub lower_hysteresis: Option<f64>,

    /// Upper hysteresis threshold in volts
    #[serde(default, alias = "UpperHysteresys")]
    pub upper_hysteresis: Option<f64>,
}

impl DigitalIoConfig {
    /// Deserialize from a device `config` table.
    pub fn from_value(value: &toml::Value) -> Result<Self> {
        value
            .clone()
            .try_into()
            .map_err(|e: toml::de::Error| IomError::config(format!("digital I/O config: {}", e)))
    }

    /// Check the reference voltage against the whitelist and the hysteresis band.
    pub fn validate(&self) -> Result<()> {
        let reference = self.voltage_reference;
        if !SUPPORTED_REFERENCE_VOLTAGES
            .iter()
            .any(|&v| (v - reference).abs() < f64::EPSILON)
        {
            return Err(IomError::UnsupportedVoltageReference {
                value: reference,
                supported: SUPPORTED_REFERENCE_VOLTAGES,
            });
        }

        match (self.lower_hysteresis, self.upper_hysteresis) {
            (None, None) => Ok(()),
            (Some(_), None) | (None, Some(_)) => Err(IomError::InvalidHysteresis {
                message: "lower and upper thresholds must be set together".into(),
            }),
            (Some(lower), Some(upper)) => {
                if !lower.is_finite() || !upper.is_finite() {
                    return Err(IomError::InvalidHysteresis {
                        message: format!("thresholds must be finite (lower={lower}, upper={upper})"),
                    });
                }
                if lower < 0.0 || lower > upper || upper > reference {
                    return Err(IomError::InvalidHysteresis {
                        message: format!(
                            "expected 0 <= lower <= upper <= {reference}, got lower={lower}, upper={upper}"
                        ),
                    });
                }
                Ok(())
            }
        }
    }

    /// `(lower, upper)` when hysteresis is configured.
    pub fn hysteresis(&self) -> Option<(f64, f64)> {
        self.lower_hysteresis.zip(self.upper_hysteresis)
    }
}

/// The digital board.
#[derive(Debug)]
pub struct DigitalIoDevice {
    core: DeviceCore,
    config: DigitalIoConfig,
}

impl DigitalIoDevice {
    /// Registry class name.
    pub const CLASS: &'static str = "dio-404";

    /// Build a board, rejecting invalid settings.
    pub fn new(identity: DeviceIdentity, config: DigitalIoConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            name = %identity.name,
            devn = identity.devn,
            voltage_reference = config.voltage_reference,
            hysteresis = ?config.hysteresis(),
            "Created digital I/O device"
        );
        Ok(Self {
            core: DeviceCore::new(identity),
            config,
        })
    }

    pub fn config(&self) -> &DigitalIoConfig {
        &self.config
    }

    fn ensure_channel(&self, channel: u32, direction: SignalDirection) -> Result<()> {
        if self.check_channel_and_direction(channel, direction) {
            Ok(())
        } else {
            Err(IomError::InvalidChannel {
                devn: self.devn(),
                channel,
                direction,
                max: self.channel_count(direction),
            })
        }
    }

    /// Width of `signal_type`, failing for types the board does not accept.
    fn accepted_width(&self, signal_type: SignalType) -> Result<usize> {
        match signal_type.byte_size() {
            Some(size) if self.accepted_signal_type(signal_type) => Ok(size),
            _ => Err(IomError::UnsupportedSignalType { signal_type }),
        }
    }
}

impl Device for DigitalIoDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn model(&self) -> ModelCode {
        DIO_404_MODEL
    }

    fn channel_count(&self, direction: SignalDirection) -> u32 {
        match direction {
            SignalDirection::Input | SignalDirection::Output => DIO_404_CHANNELS,
            SignalDirection::None => 0,
        }
    }

    fn words_per_scan(&self, direction: SignalDirection) -> u32 {
        match direction {
            SignalDirection::Input | SignalDirection::Output => 1,
            SignalDirection::None => 0,
        }
    }

    fn accepted_signal_type(&self, signal_type: SignalType) -> bool {
        matches!(
            signal_type,
            SignalType::UInt8
                | SignalType::UInt16
                | SignalType::UInt32
                | SignalType::UInt64
                | SignalType::Float32
                | SignalType::Float64
                | SignalType::Bool
        )
    }

    fn configure_channels(
        &self,
        direction: SignalDirection,
        mode: ScanMode,
    ) -> Result<Vec<ChannelListEntry>> {
        if !direction.is_valid() {
            return Err(IomError::InvalidDirection {
                operation: "configure_channels",
            });
        }
        let channels = self.requested_channels(direction);
        if channels.is_empty() {
            return Err(IomError::NoChannelsRequested {
                devn: self.devn(),
                direction,
            });
        }
        let mask = channels.iter().fold(0u16, |mask, &c| mask | (1 << c));
        Ok(vec![ChannelListEntry::new(0, mask, mode)])
    }

    fn scale_signal(
        &self,
        channel: u32,
        n_samples: u32,
        source: &mut SampleCursor<'_>,
        destination: &mut [u8],
        dest_type: SignalType,
    ) -> Result<()> {
        let width = self.accepted_width(dest_type)?;
        self.ensure_channel(channel, SignalDirection::Input)?;

        let n = n_samples as usize;
        let required = n * width;
        if destination.len() < required {
            return Err(IomError::DestinationTooSmall {
                required,
                actual: destination.len(),
            });
        }

        for (i, slot) in destination[..required].chunks_exact_mut(width).enumerate() {
            let word = source.next().ok_or(IomError::BufferUnderrun {
                requested: n * HardwareWord::SIZE,
                available: i * HardwareWord::SIZE,
            })?;
            dest_type.encode_bit(word.bit(channel), slot);
        }
        Ok(())
    }

    fn set_output_signal(
        &mut self,
        channel: u32,
        n_samples: u32,
        source: &[u8],
        src_type: SignalType,
    ) -> Result<()> {
        let width = self.accepted_width(src_type)?;
        self.ensure_channel(channel, SignalDirection::Output)?;

        let n = n_samples as usize;
        if source.len() < n * width {
            return Err(IomError::DestinationTooSmall {
                required: n * width,
                actual: source.len(),
            });
        }

        let bytes = n * HardwareWord::SIZE;
        match self.core.staged_output_samples() {
            Some(staged) if staged != n_samples => {
                return Err(IomError::SampleCountMismatch {
                    staged,
                    requested: n_samples,
                });
            }
            Some(_) => {}
            None => {
                self.output_buffer_mut().zero_next_bytes(bytes)?;
                self.core.set_staged_output_samples(Some(n_samples));
            }
        }

        let region = self.output_buffer_mut().write_region(bytes)?;
        for (slot, value) in region
            .chunks_exact_mut(HardwareWord::SIZE)
            .zip(source.chunks_exact(width))
        {
            let bit = src_type
                .decode_bit(value)
                .ok_or(IomError::UnsupportedSignalType {
                    signal_type: src_type,
                })?;
            let word = HardwareWord::read_from(slot).ok_or(IomError::DestinationTooSmall {
                required: HardwareWord::SIZE,
                actual: slot.len(),
            })?;
            word.with_bit(channel, bit).write_to(slot);
        }
        Ok(())
    }

    fn configure_device(
        &mut self,
        transport: &mut dyn ChassisTransport,
        handle: ChassisHandle,
    ) -> Result<()> {
        self.config.validate()?;
        let devn = self.devn();

        transport.write_layer_setting(
            handle,
            devn,
            &LayerSetting::ReferenceVoltage(self.config.voltage_reference),
        )?;
        if let Some((lower, upper)) = self.config.hysteresis() {
            transport.write_layer_setting(handle, devn, &LayerSetting::Hysteresis { lower, upper })?;
        }

        let words_in = self.words_per_scan(SignalDirection::Input);
        let words_out = self.words_per_scan(SignalDirection::Output);
        let sample_size = self.sample_size();
        self.core.allocate_buffers(words_in, words_out, sample_size)?;

        debug!(
            devn,
            voltage_reference = self.config.voltage_reference,
            "Configured digital I/O device"
        );
        Ok(())
    }
}
