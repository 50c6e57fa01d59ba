//! Board abstraction shared by every device kind.
//!
//! A [`Device`] models one plug-in board identified by its slot number
//! (`devn`). It owns one input and one output [`AcquisitionBuffer`] and
//! converts between raw [`HardwareWord`]s and typed logical channel values.
//! Concrete kinds embed a [`DeviceCore`] holding the state every board
//! shares and implement the model-specific parts of the trait.

use std::sync::Arc;

use daq_core::signal::{SignalDirection, SignalType};
use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::AcquisitionBuffer;
use crate::error::{IomError, Result};
use crate::transport::{ChassisHandle, ChassisTransport};
use crate::word::{HardwareWord, SampleCursor};

/// Board shared between the connection manager and the maps that use it.
pub type SharedDevice = Arc<Mutex<dyn Device>>;

/// Hardware model code reported by the chassis for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelCode(pub u32);

impl std::fmt::Display for ModelCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// How a map drives the channels of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// One sample per channel per scan.
    #[default]
    PointByPoint,
    /// Several samples per channel accumulate before the consumer runs.
    Buffered,
}

/// One word of a hardware channel list.
///
/// ```text
/// bit 31      : buffered scan flag
/// bits 8..24  : enabled line mask within the hardware word
/// bits 0..8   : hardware word index within the scan
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelListEntry(u32);

impl ChannelListEntry {
    const BUFFERED_FLAG: u32 = 1 << 31;
    const MASK_SHIFT: u32 = 8;

    pub fn new(word_index: u8, line_mask: u16, mode: ScanMode) -> Self {
        let flag = match mode {
            ScanMode::PointByPoint => 0,
            ScanMode::Buffered => Self::BUFFERED_FLAG,
        };
        Self(u32::from(word_index) | (u32::from(line_mask) << Self::MASK_SHIFT) | flag)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn word_index(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn line_mask(self) -> u16 {
        ((self.0 >> Self::MASK_SHIFT) & 0xFFFF) as u16
    }

    pub fn mode(self) -> ScanMode {
        if self.0 & Self::BUFFERED_FLAG != 0 {
            ScanMode::Buffered
        } else {
            ScanMode::PointByPoint
        }
    }
}

/// Identity and buffer geometry every board is declared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Name maps use to reference the board
    pub name: String,
    /// Slot number inside the chassis
    pub devn: u32,
    /// Records each acquisition buffer holds
    pub number_of_buffers: u32,
    /// Samples per channel in one record
    pub samples_per_channel: u32,
}

/// State shared by all device kinds.
#[derive(Debug)]
pub struct DeviceCore {
    identity: DeviceIdentity,
    input: AcquisitionBuffer,
    output: AcquisitionBuffer,
    input_channels: Vec<u32>,
    output_channels: Vec<u32>,
    staged_output_samples: Option<u32>,
}

impl DeviceCore {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            input: AcquisitionBuffer::new(),
            output: AcquisitionBuffer::new(),
            input_channels: Vec::new(),
            output_channels: Vec::new(),
            staged_output_samples: None,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Buffer for `direction`, `None` for `SignalDirection::None`.
    pub fn buffer(&self, direction: SignalDirection) -> Option<&AcquisitionBuffer> {
        match direction {
            SignalDirection::Input => Some(&self.input),
            SignalDirection::Output => Some(&self.output),
            SignalDirection::None => None,
        }
    }

    pub fn buffer_mut(&mut self, direction: SignalDirection) -> Option<&mut AcquisitionBuffer> {
        match direction {
            SignalDirection::Input => Some(&mut self.input),
            SignalDirection::Output => Some(&mut self.output),
            SignalDirection::None => None,
        }
    }

    /// Allocate the buffers of every direction that has at least one word per scan.
    pub fn allocate_buffers(
        &mut self,
        input_words: u32,
        output_words: u32,
        sample_size: usize,
    ) -> Result<()> {
        let DeviceIdentity {
            number_of_buffers,
            samples_per_channel,
            ..
        } = self.identity;
        if input_words > 0 {
            self.input.init(
                SignalDirection::Input,
                number_of_buffers,
                samples_per_channel,
                input_words,
                sample_size,
            )?;
        }
        if output_words > 0 {
            self.output.init(
                SignalDirection::Output,
                number_of_buffers,
                samples_per_channel,
                output_words,
                sample_size,
            )?;
        }
        debug!(
            devn = self.identity.devn,
            input_bytes = self.input.capacity(),
            output_bytes = self.output.capacity(),
            "Allocated device buffers"
        );
        Ok(())
    }

    pub fn requested_channels(&self, direction: SignalDirection) -> &[u32] {
        match direction {
            SignalDirection::Input => &self.input_channels,
            SignalDirection::Output => &self.output_channels,
            SignalDirection::None => &[],
        }
    }

    /// Replace the requested channel list of `direction`.
    ///
    /// Channels are kept sorted and deduplicated.
    pub fn set_requested_channels(&mut self, direction: SignalDirection, channels: &[u32]) {
        let mut list = channels.to_vec();
        list.sort_unstable();
        list.dedup();
        match direction {
            SignalDirection::Input => self.input_channels = list,
            SignalDirection::Output => self.output_channels = list,
            SignalDirection::None => {}
        }
    }

    pub fn staged_output_samples(&self) -> Option<u32> {
        self.staged_output_samples
    }

    pub fn set_staged_output_samples(&mut self, samples: Option<u32>) {
        self.staged_output_samples = samples;
    }
}

/// Capability set of one board.
///
/// Object safe; boards live behind [`SharedDevice`].
pub trait Device: Send + std::fmt::Debug {
    /// Shared state.
    fn core(&self) -> &DeviceCore;

    /// Shared state, mutable.
    fn core_mut(&mut self) -> &mut DeviceCore;

    /// Registry class this board was built from.
    fn class_name(&self) -> &'static str;

    /// Model code the chassis must report at this board's slot.
    fn model(&self) -> ModelCode;

    /// Logical channels available in `direction` (0 for `None`).
    fn channel_count(&self, direction: SignalDirection) -> u32;

    /// Hardware words one scan of `direction` occupies.
    fn words_per_scan(&self, direction: SignalDirection) -> u32;

    /// Bytes per hardware sample.
    fn sample_size(&self) -> usize {
        HardwareWord::SIZE
    }

    /// Whether channel values may be materialised as `signal_type`.
    fn accepted_signal_type(&self, signal_type: SignalType) -> bool;

    /// Hardware channel list for the channels requested in `direction`.
    ///
    /// Fails when `direction` is `None` or nothing was requested.
    fn configure_channels(
        &self,
        direction: SignalDirection,
        mode: ScanMode,
    ) -> Result<Vec<ChannelListEntry>>;

    /// Extract `channel` from `n_samples` scans read through `source`.
    ///
    /// `source` yields every word of each scan in order.
    fn scale_signal(
        &self,
        channel: u32,
        n_samples: u32,
        source: &mut SampleCursor<'_>,
        destination: &mut [u8],
        dest_type: SignalType,
    ) -> Result<()>;

    /// Pack `n_samples` values of `channel` into the staged output record.
    fn set_output_signal(
        &mut self,
        channel: u32,
        n_samples: u32,
        source: &[u8],
        src_type: SignalType,
    ) -> Result<()>;

    /// Push the board's settings through the transport and allocate buffers.
    fn configure_device(
        &mut self,
        transport: &mut dyn ChassisTransport,
        handle: ChassisHandle,
    ) -> Result<()>;

    fn name(&self) -> &str {
        &self.core().identity().name
    }

    fn devn(&self) -> u32 {
        self.core().identity().devn
    }

    fn samples_per_channel(&self) -> u32 {
        self.core().identity().samples_per_channel
    }

    fn number_of_buffers(&self) -> u32 {
        self.core().identity().number_of_buffers
    }

    /// Bytes of one record in `direction`.
    fn record_size(&self, direction: SignalDirection) -> usize {
        self.samples_per_channel() as usize
            * self.words_per_scan(direction) as usize
            * self.sample_size()
    }

    /// True iff `channel` exists in `direction`.
    fn check_channel_and_direction(&self, channel: u32, direction: SignalDirection) -> bool {
        direction.is_valid() && channel < self.channel_count(direction)
    }

    /// Register the channels a map wants in `direction`.
    fn set_channels(&mut self, direction: SignalDirection, channels: &[u32]) -> Result<()> {
        if !direction.is_valid() {
            return Err(IomError::InvalidDirection {
                operation: "set_channels",
            });
        }
        if let Some(&channel) = channels
            .iter()
            .find(|&&c| !self.check_channel_and_direction(c, direction))
        {
            return Err(IomError::InvalidChannel {
                devn: self.devn(),
                channel,
                direction,
                max: self.channel_count(direction),
            });
        }
        self.core_mut().set_requested_channels(direction, channels);
        Ok(())
    }

    /// Channels registered for `direction`.
    fn requested_channels(&self, direction: SignalDirection) -> &[u32] {
        self.core().requested_channels(direction)
    }

    /// Extract `channel` from the committed input samples without consuming them.
    ///
    /// The consumer calls this once per channel and then checks the input
    /// buffer out.
    fn retrieve_input_signal(
        &self,
        channel: u32,
        n_samples: u32,
        destination: &mut [u8],
        dest_type: SignalType,
    ) -> Result<()> {
        if !self.accepted_signal_type(dest_type) {
            return Err(IomError::UnsupportedSignalType {
                signal_type: dest_type,
            });
        }
        let scan_bytes = self.words_per_scan(SignalDirection::Input) as usize * self.sample_size();
        let raw = self.input_buffer().peek(n_samples as usize * scan_bytes)?;
        let mut cursor = SampleCursor::new(raw);
        self.scale_signal(channel, n_samples, &mut cursor, destination, dest_type)
    }

    /// Commit the staged output record; a no-op when nothing is staged.
    fn flush_output_signals(&mut self) -> Result<()> {
        let Some(samples) = self.core().staged_output_samples() else {
            return Ok(());
        };
        let bytes =
            samples as usize * self.words_per_scan(SignalDirection::Output) as usize * self.sample_size();
        self.output_buffer_mut().advance_buffer_index(bytes)?;
        self.core_mut().set_staged_output_samples(None);
        Ok(())
    }

    /// Discard all buffered data of one direction. Resetting the output side
    /// also drops a staged record.
    fn reset_buffer(&mut self, direction: SignalDirection) {
        let core = self.core_mut();
        if direction == SignalDirection::Output {
            core.set_staged_output_samples(None);
        }
        if let Some(buffer) = core.buffer_mut(direction) {
            buffer.reset_buffer();
        }
    }

    fn input_buffer(&self) -> &AcquisitionBuffer {
        &self.core().input
    }

    fn input_buffer_mut(&mut self) -> &mut AcquisitionBuffer {
        &mut self.core_mut().input
    }

    fn output_buffer(&self) -> &AcquisitionBuffer {
        &self.core().output
    }

    fn output_buffer_mut(&mut self) -> &mut AcquisitionBuffer {
        &mut self.core_mut().output
    }
}
