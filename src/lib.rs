//! SATA Boot Shim - boot-DOM identity spoofing for generic SATA disks
//!
//! The host kernel recognizes its boot DOM (Disk-on-Module) purely by a
//! vendor/model string pair baked into drive firmware. SATA/SCSI offers no
//! stable out-of-band identifier to match on instead: there is no VID/PID
//! like USB, serial numbers collapse under hypervisors, and host/port
//! topology moves between boots. The one stable heuristic is capacity, so
//! this crate shims the *first* SATA disk at or under a configured size
//! threshold into the boot-DOM identity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SataBootShim                             │
//! │                   install / uninstall lifecycle                 │
//! ├───────────────────────────┬─────────────────────────────────────┤
//! │  Probe Interception       │  Existing-Device Reconciler         │
//! │  (wraps the sd probe)     │  (remove + rescan at install time)  │
//! ├───────────────────────────┴─────────────────────────────────────┤
//! │                    Eligibility Classifier                       │
//! │          SATA leaf disk? capacity <= DOM threshold?             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      Capacity Prober                            │
//! │      READ CAPACITY (16) -> (10) fallback, bounded retries       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! New arrivals flow through the intercepting probe; a match gets its
//! identity rewritten before the real probe runs, and the real probe always
//! runs. Devices enumerated before install are forced through a logical
//! disconnect/rescan cycle so they take the same path.
//!
//! # Modules
//!
//! - [`bus`]: trait seams around the host SCSI bus/driver subsystem
//! - [`config`]: boot media descriptor and boot-DOM identity constants
//! - [`probe`]: side-effect-free capacity probing
//! - [`shim`]: classifier, interception engine and reconciler
//! - [`error`]: error types and handling

pub mod bus;
pub mod config;
pub mod error;
pub mod shim;

#[cfg(feature = "native-sata-dom")]
pub mod probe;

#[cfg(all(test, feature = "native-sata-dom"))]
pub(crate) mod testing;

// Re-export commonly used types
pub use bus::{
    BusKind, CommandRequest, CommandStatus, DeviceType, DiskDriver, PortKind, ProbeFn,
    ProbeOutcome, ScanTarget, ScsiBus, ScsiDevice, ScsiHost, SenseData, SenseKey,
};

pub use config::{BootMediaConfig, DeviceClass, DeviceIdentity};

pub use error::{Error, Result};

pub use shim::{SataBootShim, DISK_DRIVER_NAME};

#[cfg(feature = "native-sata-dom")]
pub use probe::probe_capacity_mib;
#[cfg(feature = "native-sata-dom")]
pub use shim::is_sata_disk;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
