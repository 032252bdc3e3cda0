//! Error types for the SATA boot shim
//!
//! Provides structured error types for the shim lifecycle, the host bus
//! lookup, and the low-level capacity probe.

use thiserror::Error;

/// Unified error type for the shim
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Lifecycle / Configuration Errors
    // =========================================================================
    #[error("Boot media class {class} is not supported by the SATA shim")]
    InvalidConfig { class: crate::config::DeviceClass },

    #[error("SATA boot shim is already installed")]
    AlreadyInstalled,

    #[error("SATA boot shim is not installed")]
    NotInstalled,

    #[error("Boot-DOM support is not compiled into this build")]
    BootDomUnsupported,

    // =========================================================================
    // Host Bus Errors
    // =========================================================================
    #[error("Driver not found on the host bus: {driver}")]
    DriverNotFound { driver: String },

    // =========================================================================
    // Capacity Probe Errors
    // =========================================================================
    #[error("Transport buffer allocation failed during capacity probe")]
    AllocationFailure,

    #[error("Device {device} refused to report its capacity")]
    CommandHardRefused { device: String },

    #[error("Capacity query on {device} failed after {attempts} attempts")]
    CommandRetryExhausted { device: String, attempts: u32 },
}

impl Error {
    /// Check if this error is transient (a later retry of the whole
    /// operation could succeed)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::AllocationFailure | Error::CommandRetryExhausted { .. }
        )
    }

    /// Check if this error came out of the capacity probe path
    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            Error::AllocationFailure
                | Error::CommandHardRefused { .. }
                | Error::CommandRetryExhausted { .. }
        )
    }
}

/// Result type alias for the shim
pub type Result<T> = std::result::Result<T, Error>;
