//! Boot Media Configuration
//!
//! Install-time descriptor handed over by the boot-configuration framework,
//! plus the build-time boot-DOM identity the host kernel is patched to
//! recognize. The shim and the kernel must agree on these literal strings.

use serde::{Deserialize, Serialize};

// =============================================================================
// Boot Media Descriptor
// =============================================================================

/// Boot media classes known to the boot-configuration framework
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Sata,
    Usb,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Sata => write!(f, "sata"),
            DeviceClass::Usb => write!(f, "usb"),
        }
    }
}

/// Boot media descriptor supplied at install time
///
/// Owned by the boot-configuration framework; the shim only borrows it for
/// the duration of `install`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootMediaConfig {
    /// Media class this descriptor targets
    pub device_class: DeviceClass,
    /// Inclusive upper-bound capacity of a boot DOM, in mebibytes
    pub dom_size_mib: u64,
}

// =============================================================================
// Device Identity
// =============================================================================

/// Vendor/model string pair of a SCSI device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor: String,
    pub model: String,
}

impl DeviceIdentity {
    pub fn new(vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
        }
    }

    /// The identity the host kernel recognizes as a SATA boot DOM
    #[cfg(feature = "native-sata-dom")]
    pub fn boot_dom() -> Self {
        Self::new(SATA_DOM_VENDOR, SATA_DOM_MODEL)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vendor=\"{}\" model=\"{}\"", self.vendor, self.model)
    }
}

// =============================================================================
// Boot-DOM Identity Constants
// =============================================================================

/// Primary boot-DOM vendor string recognized by the patched kernel
#[cfg(feature = "native-sata-dom")]
pub const SATA_DOM_VENDOR: &str = "SATADOM";

/// Primary boot-DOM model string recognized by the patched kernel
#[cfg(feature = "native-sata-dom")]
pub const SATA_DOM_MODEL: &str = "TYPE D 3SE";

/// Second-source vendor string (older platform generations)
#[cfg(feature = "native-sata-dom")]
pub const SATA_DOM_VENDOR_SECOND_SRC: &str = "SATADOM-";

/// Second-source model string (older platform generations)
#[cfg(feature = "native-sata-dom")]
pub const SATA_DOM_MODEL_SECOND_SRC: &str = "D150SH";
