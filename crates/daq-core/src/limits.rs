//! Shared hard limits and defaults for chassis connections.
//!
//! Centralised so the configuration layer, the connection manager and the
//! CLI agree on the same numbers.

use std::time::Duration;

// =============================================================================
// Connection
// =============================================================================

/// Maximum number of boards one chassis connection may declare.
pub const MAX_DEVICES_PER_CONNECTION: usize = 12;

/// Connection timeout used when the configuration does not set one.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(200);

/// Configuration key value selecting the local chassis instead of an IP.
pub const LOCAL_CHASSIS_SENTINEL: &str = "local";

// =============================================================================
// Buffers
// =============================================================================

/// Default number of records an acquisition buffer holds.
///
/// Two records let the scan path fill one while the consumer drains the other.
pub const DEFAULT_NUMBER_OF_BUFFERS: u32 = 2;

/// Default samples per channel in one record.
pub const DEFAULT_SAMPLES_PER_CHANNEL: u32 = 1;

/// Upper bound on a single buffer allocation (16 MiB).
pub const MAX_BUFFER_BYTES: usize = 16 * 1024 * 1024;
