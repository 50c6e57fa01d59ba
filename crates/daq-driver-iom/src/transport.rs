//! Chassis transport abstraction.
//!
//! The vendor library that talks to the chassis is an opaque collaborator.
//! [`ConnectionManager`](crate::ConnectionManager) owns one boxed
//! [`ChassisTransport`] and every hardware call goes through it, so tests and
//! the CLI inject a [`SimulatedChassis`](crate::SimulatedChassis) instead of
//! touching process-wide state.

use std::net::Ipv4Addr;
use std::num::NonZeroU32;
use std::time::Duration;

use daq_core::signal::SignalDirection;
use thiserror::Error;

use crate::device::{ChannelListEntry, ModelCode};

/// Non-zero handle returned by a successful chassis open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChassisHandle(NonZeroU32);

impl ChassisHandle {
    /// Wrap a raw handle, rejecting zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Where the chassis lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChassisAddress {
    /// Chassis reachable without a network hop.
    Local,
    /// Chassis reachable over the network.
    Remote { ip: Ipv4Addr, port: u16 },
}

impl std::fmt::Display for ChassisAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote { ip, port } => write!(f, "{}:{}", ip, port),
        }
    }
}

/// One board-level setting pushed through the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerSetting {
    /// Logic reference voltage of a digital board.
    ReferenceVoltage(f64),
    /// Input hysteresis band in volts.
    Hysteresis { lower: f64, upper: f64 },
    /// Channel list for one direction.
    ChannelList {
        direction: SignalDirection,
        entries: Vec<ChannelListEntry>,
    },
}

/// Failure reported by the chassis library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Transport operation '{operation}' failed with code {code}")]
pub struct TransportError {
    pub operation: &'static str,
    pub code: i32,
}

impl TransportError {
    pub fn new(operation: &'static str, code: i32) -> Self {
        Self { operation, code }
    }
}

/// Calls the core needs from the chassis library.
///
/// Raw handles are plain `u32` on this boundary: the library may hand back
/// zero and the manager must be the one to reject it.
pub trait ChassisTransport: Send {
    /// Load and initialise the vendor library.
    fn open_library(&mut self) -> Result<(), TransportError>;

    /// Release the vendor library.
    fn close_library(&mut self);

    /// Open the chassis, returning the raw handle.
    fn open_chassis(
        &mut self,
        address: &ChassisAddress,
        timeout: Duration,
    ) -> Result<u32, TransportError>;

    /// Close a chassis opened by [`open_chassis`](Self::open_chassis).
    fn close_chassis(&mut self, handle: ChassisHandle) -> Result<(), TransportError>;

    /// Model code installed at `devn`, `None` if the slot is empty.
    fn installed_model(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
    ) -> Result<Option<ModelCode>, TransportError>;

    /// Apply one setting to the board at `devn`.
    fn write_layer_setting(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
        setting: &LayerSetting,
    ) -> Result<(), TransportError>;

    /// Fill `dest` with the next raw scan bytes of the board at `devn`.
    fn read_scan(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
        dest: &mut [u8],
    ) -> Result<(), TransportError>;

    /// Send raw output scan bytes to the board at `devn`.
    fn write_scan(
        &mut self,
        handle: ChassisHandle,
        devn: u32,
        src: &[u8],
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rejects_zero() {
        assert!(ChassisHandle::new(0).is_none());
        assert_eq!(ChassisHandle::new(7).map(ChassisHandle::get), Some(7));
    }

    #[test]
    fn test_address_display() {
        let remote = ChassisAddress::Remote {
            ip: Ipv4Addr::new(192, 168, 100, 2),
            port: 6334,
        };
        assert_eq!(remote.to_string(), "192.168.100.2:6334");
        assert_eq!(ChassisAddress::Local.to_string(), "local");
    }
}
