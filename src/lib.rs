//! # iom-daq
//!
//! Application layer over the chassis driver in `daq-driver-iom`: figment
//! based configuration, tracing setup and a periodic acquisition runner used
//! by the `iom-daq` binary.
//!
//! ## Crate Structure
//!
//! - [`config`]: `AppConfig` loaded from TOML with `IOM_DAQ_` environment
//!   overrides
//! - [`logging`]: `tracing-subscriber` initialisation
//! - [`acquisition`]: connect to a chassis and run map cycles on a tokio
//!   interval

pub mod acquisition;
pub mod config;
pub mod logging;

pub use daq_core::error::{AppResult, DaqError};
