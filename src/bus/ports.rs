//! Host Bus Ports - trait seams around the SCSI bus/driver subsystem
//!
//! These traits define the boundary between the shim and the host bus layer.
//! The host environment implements them over its real driver subsystem; the
//! tests implement them over a scripted fake.

use crate::config::DeviceIdentity;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Bus Descriptors
// =============================================================================

/// Transport a SCSI device sits behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Sata,
    Sas,
    Iscsi,
    Unknown,
}

/// SCSI peripheral device type, as reported by the bus layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Disk,
    Tape,
    Cdrom,
    Enclosure,
    Other,
}

/// Port kind reported by a host controller
///
/// Distinct from [`BusKind`]: several transports speak the SCSI command
/// protocol, only the controller knows what sits on the physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Sata,
    Sas,
    Iscsi,
    Unknown,
}

impl std::fmt::Display for PortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortKind::Sata => write!(f, "sata"),
            PortKind::Sas => write!(f, "sas"),
            PortKind::Iscsi => write!(f, "iscsi"),
            PortKind::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Probe Hook
// =============================================================================

/// Outcome of a driver probe, passed through the shim unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Driver bound the device
    Bound,
    /// Driver declined or failed with an errno-style code
    Failed(i32),
}

/// A driver probe entry point
///
/// Invoked by the bus layer whenever a device is matched to the driver.
/// Arrivals on different host controllers may be delivered concurrently.
pub type ProbeFn = Arc<dyn Fn(&Arc<dyn ScsiDevice>) -> ProbeOutcome + Send + Sync>;

// =============================================================================
// Rescan Target
// =============================================================================

/// Addressing for a host controller rescan
///
/// `None` slots are wildcards; a fully wildcard target re-enumerates every
/// channel/id/lun of the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTarget {
    pub channel: Option<u32>,
    pub id: Option<u32>,
    pub lun: Option<u32>,
}

impl ScanTarget {
    /// Rescan every slot of the host
    pub fn wildcard() -> Self {
        Self::default()
    }
}

// =============================================================================
// Device Command Layer
// =============================================================================

/// SCSI sense keys (SPC), as delivered in a sense diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenseKey {
    NoSense,
    RecoveredError,
    NotReady,
    MediumError,
    HardwareError,
    IllegalRequest,
    UnitAttention,
    DataProtect,
    AbortedCommand,
}

/// Structured sense diagnostic returned with a failed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    pub key: SenseKey,
    /// Additional sense code
    pub asc: u8,
    /// Additional sense code qualifier
    pub ascq: u8,
}

impl SenseData {
    pub fn new(key: SenseKey, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }

    /// Drive deliberately rejected the request: invalid opcode (0x20) or
    /// invalid field in CDB (0x24). The condition will not change on retry.
    pub fn denies_command(&self) -> bool {
        self.key == SenseKey::IllegalRequest
            && (self.asc == 0x20 || self.asc == 0x24)
            && self.ascq == 0x00
    }

    /// Drive reported a power-on/reset unit attention; it may answer after
    /// a short wait (spinning media coming up, bridge resets).
    pub fn reports_busy(&self) -> bool {
        self.key == SenseKey::UnitAttention && self.asc == 0x29 && self.ascq == 0x00
    }
}

/// Envelope for a synchronous SCSI command
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Command descriptor block, zero-padded to 16 bytes
    pub cdb: [u8; 16],
    /// Expected data-in length
    pub data_len: usize,
    /// Per-command timeout enforced by the transport
    pub timeout: Duration,
    /// Transport-internal retry count (distinct from the shim's own budget)
    pub retries: u32,
}

/// Result of a completed (issued and answered) SCSI command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Command succeeded, data buffer is valid
    Ok,
    /// Command failed; the sense diagnostic may be absent or invalid
    Failed { sense: Option<SenseData> },
}

// =============================================================================
// Host Bus Ports
// =============================================================================

/// The SCSI bus as seen by the shim
pub trait ScsiBus: Send + Sync {
    /// Look up a registered driver by name
    fn find_driver(&self, name: &str) -> Option<Arc<dyn DiskDriver>>;
}

/// A disk driver registered on the SCSI bus
pub trait DiskDriver: Send + Sync {
    /// Driver name ("sd" for the standard disk driver)
    fn name(&self) -> &str;

    /// Current probe entry point
    fn probe_fn(&self) -> ProbeFn;

    /// Replace the probe entry point
    ///
    /// The new probe may be invoked concurrently with arbitrary bus activity
    /// the moment this call returns.
    fn set_probe_fn(&self, probe: ProbeFn);

    /// Devices currently bound on the driver's bus
    ///
    /// A finite, non-restartable snapshot; devices arriving after the call
    /// go through the probe path instead.
    fn devices(&self) -> Box<dyn Iterator<Item = Arc<dyn ScsiDevice>> + '_>;
}

/// A host controller
pub trait ScsiHost: Send + Sync {
    /// Host number, stable for the controller's lifetime
    fn host_no(&self) -> u32;

    /// Kind of port this controller exposes
    fn port_kind(&self) -> PortKind;

    /// Logically detach a device from this host
    fn remove_device(&self, device: &Arc<dyn ScsiDevice>);

    /// Transport-template rescan hook, if the transport provides one
    ///
    /// Returns `false` when the transport has no hook; the caller falls back
    /// to [`ScsiHost::generic_rescan`].
    fn transport_rescan(&self, target: ScanTarget) -> bool;

    /// Generic rescan walking every slot matched by `target`
    fn generic_rescan(&self, target: ScanTarget);
}

/// A single device enumerated by the host bus
pub trait ScsiDevice: Send + Sync {
    /// Bus address in "host:channel:id:lun" form, for diagnostics
    fn name(&self) -> String;

    /// Whether this is an end (leaf) device rather than a host or an
    /// intermediate bus node
    fn is_leaf(&self) -> bool;

    /// Peripheral device type
    fn device_type(&self) -> DeviceType;

    /// Host controller the device hangs off
    fn host(&self) -> Arc<dyn ScsiHost>;

    /// Current vendor/model identity
    fn identity(&self) -> DeviceIdentity;

    /// Rewrite the vendor/model identity
    fn set_identity(&self, identity: DeviceIdentity);

    /// Execute an opaque SCSI command synchronously
    ///
    /// `Err` is reserved for transport-level trouble (buffer allocation);
    /// command-level failure comes back as [`CommandStatus::Failed`].
    fn execute(&self, request: &CommandRequest, data: &mut [u8]) -> Result<CommandStatus>;
}
