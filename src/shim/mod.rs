//! The identity-spoofing engine: classification, probe interception and
//! reconciliation of already-enumerated devices

pub mod engine;

#[cfg(feature = "native-sata-dom")]
pub mod classifier;
#[cfg(feature = "native-sata-dom")]
pub(crate) mod reconcile;

pub use engine::{SataBootShim, DISK_DRIVER_NAME};

#[cfg(feature = "native-sata-dom")]
pub use classifier::is_sata_disk;
