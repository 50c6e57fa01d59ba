//! Custom error types shared by every iom-daq crate.
//!
//! `DaqError` is the application-level error. Driver crates keep their own
//! detailed `thiserror` enums and convert into [`DaqError::Driver`] through a
//! `From` impl, classifying each failure with a [`DriverErrorKind`].
//!
//! ## Error Categories
//!
//! - **Configuration**: malformed or inconsistent settings. Permanent, the
//!   configuration must be fixed and the connection rebuilt.
//! - **Hardware mismatch**: the installed board differs from the configured
//!   one. Permanent.
//! - **Transport**: the chassis library reported a failure. Not retried
//!   automatically.
//! - **Resource exhausted**: a buffer write would exceed capacity. Local and
//!   recoverable after the consumer checks the buffer out.
//! - **Unsupported type**: a signal was requested in a numeric representation
//!   the device cannot produce. Local, rejects the single operation.

use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Classification of a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    Configuration,
    HardwareMismatch,
    Transport,
    ResourceExhausted,
    UnsupportedType,
    InvalidState,
}

impl DriverErrorKind {
    /// Whether the failure only affects the single operation that raised it.
    ///
    /// Fatal kinds abort initialisation and leave the connection unusable.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::ResourceExhausted | Self::UnsupportedType)
    }
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::HardwareMismatch => "hardware_mismatch",
            DriverErrorKind::Transport => "transport",
            DriverErrorKind::ResourceExhausted => "resource_exhausted",
            DriverErrorKind::UnsupportedType => "unsupported_type",
            DriverErrorKind::InvalidState => "invalid_state",
        };
        write!(f, "{}", label)
    }
}

#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    pub driver_type: String,
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for the DAQ application.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration validation failed.
    ///
    /// The values parsed but are semantically wrong (octet above 255, missing
    /// port for a remote chassis, unknown device class).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration text could not be parsed.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structured driver error with category.
    #[error("{0}")]
    Driver(DriverError),

    /// Teardown encountered errors.
    ///
    /// Contains every error collected while closing the chassis so none is
    /// hidden behind the first one.
    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<DaqError>),
}

impl DaqError {
    /// Driver classification, if this error came from a driver.
    pub fn driver_kind(&self) -> Option<DriverErrorKind> {
        match self {
            DaqError::Driver(err) => Some(err.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DaqError::Driver(DriverError::new(
            "iom",
            DriverErrorKind::HardwareMismatch,
            "slot 1 holds model 0x217",
        ));
        assert!(err
            .to_string()
            .contains("Driver 'iom' hardware_mismatch error"));
        assert_eq!(err.driver_kind(), Some(DriverErrorKind::HardwareMismatch));
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(DriverErrorKind::ResourceExhausted.is_recoverable());
        assert!(DriverErrorKind::UnsupportedType.is_recoverable());
        assert!(!DriverErrorKind::Transport.is_recoverable());
        assert!(!DriverErrorKind::Configuration.is_recoverable());
    }

    #[test]
    fn test_shutdown_failed_error() {
        let err = DaqError::ShutdownFailed(vec![
            DaqError::Configuration("late".into()),
            DaqError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)),
        ]);
        assert!(err.to_string().contains("Shutdown failed"));
        assert_eq!(err.driver_kind(), None);
    }
}
