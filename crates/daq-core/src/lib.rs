//! `daq-core`
//!
//! Core types shared by the iom-daq crates:
//!
//! - [`error`]: the application error [`DaqError`](error::DaqError) and the
//!   [`DriverErrorKind`](error::DriverErrorKind) taxonomy drivers classify into
//! - [`signal`]: channel direction and numeric type tags used on the
//!   runtime scaling surface
//! - [`limits`]: hard limits and defaults for connections and buffers

pub mod error;
pub mod limits;
pub mod signal;

pub use error::{AppResult, DaqError, DriverError, DriverErrorKind};
pub use signal::{SignalDirection, SignalType};
