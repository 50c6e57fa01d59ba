//! Error types for chassis and board operations.
//!
//! Every variant belongs to one [`IomErrorKind`]. Configuration, hardware
//! mismatch and transport failures are fatal for the connection being built;
//! resource exhaustion and unsupported types only reject the single call.

use daq_core::error::{DaqError, DriverError, DriverErrorKind};
use daq_core::signal::{SignalDirection, SignalType};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for chassis operations.
pub type Result<T> = std::result::Result<T, IomError>;

/// Errors that can occur while building or running a chassis connection.
#[derive(Error, Debug)]
pub enum IomError {
    /// Generic invalid setting
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Chassis address could not be parsed
    #[error("Invalid chassis address: {message}")]
    InvalidAddress { message: String },

    /// No board declared for the connection
    #[error("Connection declares no devices")]
    NoDevices,

    /// More boards declared than a chassis can hold
    #[error("Connection declares {count} devices, maximum is {max}")]
    TooManyDevices { count: usize, max: usize },

    /// Two boards claim the same slot
    #[error("Devn {devn} is used by both '{first}' and '{second}'")]
    DuplicateDevn {
        devn: u32,
        first: String,
        second: String,
    },

    /// Two boards share one name
    #[error("Device name '{name}' is declared twice")]
    DuplicateName { name: String },

    /// Device or map class not present in the registry
    #[error("Unknown {category} class '{class}'")]
    UnknownClass {
        category: &'static str,
        class: String,
    },

    /// Reference voltage not in the board whitelist
    #[error("Unsupported reference voltage {value} V (supported: {supported:?})")]
    UnsupportedVoltageReference { value: f64, supported: &'static [f64] },

    /// Hysteresis pair incomplete or out of range
    #[error("Invalid hysteresis: {message}")]
    InvalidHysteresis { message: String },

    /// Channel index beyond the board's channel count
    #[error("Invalid channel {channel}: devn {devn} has {max} {direction} channels")]
    InvalidChannel {
        devn: u32,
        channel: u32,
        direction: SignalDirection,
        max: u32,
    },

    /// `SignalDirection::None` passed to an operation
    #[error("Operation '{operation}' requires an input or output direction")]
    InvalidDirection { operation: &'static str },

    /// Channel list requested for a direction nobody registered channels on
    #[error("No {direction} channels requested on devn {devn}")]
    NoChannelsRequested { devn: u32, direction: SignalDirection },

    /// Map references a device name the connection does not know
    #[error("Map '{map}' references unknown device '{device}'")]
    UnresolvedDevice { map: String, device: String },

    /// Map failed its coherency check
    #[error("Map '{map}' is not coherent: {reason}")]
    IncoherentMap { map: String, reason: String },

    /// Configured slot has no board installed
    #[error("No hardware installed at devn {devn}")]
    MissingHardware { devn: u32 },

    /// Installed board differs from the configured one
    #[error("Model mismatch at devn {devn}: configured {expected:#06x}, installed {installed:#06x}")]
    ModelMismatch {
        devn: u32,
        expected: u32,
        installed: u32,
    },

    /// Chassis library call failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Chassis returned a zero handle or an operation used a stale one
    #[error("Invalid chassis handle")]
    InvalidHandle,

    /// Write would exceed the buffer capacity
    #[error("Buffer full: {requested} bytes requested, {available} available")]
    BufferFull { requested: usize, available: usize },

    /// Read past the last committed write
    #[error("Buffer underrun: {requested} bytes requested, {available} committed")]
    BufferUnderrun { requested: usize, available: usize },

    /// Destination slice cannot hold the requested samples
    #[error("Destination holds {actual} bytes, {required} required")]
    DestinationTooSmall { required: usize, actual: usize },

    /// Buffer used before `init`
    #[error("Buffer is not initialised")]
    BufferNotInitialised,

    /// Second `init` on the same buffer
    #[error("Buffer is already initialised")]
    BufferAlreadyInitialised,

    /// Signal type the board cannot materialise
    #[error("Unsupported signal type {signal_type}")]
    UnsupportedSignalType { signal_type: SignalType },

    /// Staged output record was started with another sample count
    #[error("Staged output holds {staged} samples, {requested} requested")]
    SampleCountMismatch { staged: u32, requested: u32 },

    /// Lifecycle call made in the wrong state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

/// Taxonomy class of an [`IomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IomErrorKind {
    Configuration,
    HardwareMismatch,
    Transport,
    ResourceExhausted,
    UnsupportedType,
    InvalidState,
}

impl IomError {
    /// Shorthand for [`IomError::InvalidConfig`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Shorthand for [`IomError::InvalidState`].
    pub fn state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Taxonomy class of this error.
    pub fn kind(&self) -> IomErrorKind {
        match self {
            IomError::InvalidConfig { .. }
            | IomError::InvalidAddress { .. }
            | IomError::NoDevices
            | IomError::TooManyDevices { .. }
            | IomError::DuplicateDevn { .. }
            | IomError::DuplicateName { .. }
            | IomError::UnknownClass { .. }
            | IomError::UnsupportedVoltageReference { .. }
            | IomError::InvalidHysteresis { .. }
            | IomError::InvalidChannel { .. }
            | IomError::InvalidDirection { .. }
            | IomError::NoChannelsRequested { .. }
            | IomError::UnresolvedDevice { .. }
            | IomError::IncoherentMap { .. }
            | IomError::BufferAlreadyInitialised => IomErrorKind::Configuration,
            IomError::MissingHardware { .. } | IomError::ModelMismatch { .. } => {
                IomErrorKind::HardwareMismatch
            }
            IomError::Transport(_) | IomError::InvalidHandle => IomErrorKind::Transport,
            IomError::BufferFull { .. }
            | IomError::BufferUnderrun { .. }
            | IomError::DestinationTooSmall { .. } => IomErrorKind::ResourceExhausted,
            IomError::UnsupportedSignalType { .. } => IomErrorKind::UnsupportedType,
            IomError::BufferNotInitialised
            | IomError::SampleCountMismatch { .. }
            | IomError::InvalidState { .. } => IomErrorKind::InvalidState,
        }
    }

    /// Whether the connection may keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            IomErrorKind::ResourceExhausted | IomErrorKind::UnsupportedType
        )
    }
}

impl From<IomError> for DaqError {
    fn from(err: IomError) -> Self {
        let kind = match err.kind() {
            IomErrorKind::Configuration => DriverErrorKind::Configuration,
            IomErrorKind::HardwareMismatch => DriverErrorKind::HardwareMismatch,
            IomErrorKind::Transport => DriverErrorKind::Transport,
            IomErrorKind::ResourceExhausted => DriverErrorKind::ResourceExhausted,
            IomErrorKind::UnsupportedType => DriverErrorKind::UnsupportedType,
            IomErrorKind::InvalidState => DriverErrorKind::InvalidState,
        };
        DaqError::Driver(DriverError::new("iom", kind, err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IomError::InvalidChannel {
            devn: 2,
            channel: 12,
            direction: SignalDirection::Input,
            max: 12,
        };
        let text = err.to_string();
        assert!(text.contains("12 input channels"));
        assert!(text.contains("devn 2"));
    }

    #[test]
    fn test_model_mismatch_display_is_hex() {
        let err = IomError::ModelMismatch {
            devn: 1,
            expected: 0x404,
            installed: 0x217,
        };
        assert!(err.to_string().contains("0x0404"));
        assert!(err.to_string().contains("0x0217"));
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(IomError::NoDevices.kind(), IomErrorKind::Configuration);
        assert_eq!(
            IomError::MissingHardware { devn: 3 }.kind(),
            IomErrorKind::HardwareMismatch
        );
        assert_eq!(IomError::InvalidHandle.kind(), IomErrorKind::Transport);
        assert!(IomError::BufferFull {
            requested: 4,
            available: 0
        }
        .is_recoverable());
        assert!(IomError::UnsupportedSignalType {
            signal_type: SignalType::Int32
        }
        .is_recoverable());
        assert!(!IomError::NoDevices.is_recoverable());
    }

    #[test]
    fn test_into_daq_error() {
        let err: DaqError = IomError::TooManyDevices { count: 13, max: 12 }.into();
        assert_eq!(err.driver_kind(), Some(DriverErrorKind::Configuration));
        assert!(err.to_string().contains("13 devices"));
    }
}
