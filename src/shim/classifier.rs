//! Eligibility Classifier
//!
//! Decides whether a device is a SATA disk at all, and whether its capacity
//! makes it the boot-DOM target. Every probe failure resolves to "not a
//! target": a drive whose size is unknown is never touched, so a
//! misclassified data disk degrades to booting as an ordinary disk.

use crate::bus::{DeviceType, PortKind, ScsiDevice};
use crate::probe::probe_capacity_mib;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Check if a device is a disk hanging off a SATA port
///
/// The bus layer enumerates hosts, intermediate nodes and end devices alike;
/// only leaf disks on a SATA-reporting controller qualify. SAS and iSCSI
/// speak the same command protocol but are never boot DOMs.
pub fn is_sata_disk(device: &Arc<dyn ScsiDevice>) -> bool {
    if !device.is_leaf() {
        return false;
    }

    device.device_type() == DeviceType::Disk && device.host().port_kind() == PortKind::Sata
}

/// Check if a SATA disk should be shimmed into the boot DOM
///
/// Only called for devices that passed [`is_sata_disk`]. First match wins:
/// once any device has been mapped this boot, later matches are surfaced as
/// anomalies and left alone. The flag is a best-effort gate; a concurrent
/// double match only produces a warning because the rewrite is idempotent
/// and per-device.
pub(crate) fn is_shim_target(
    device: &Arc<dyn ScsiDevice>,
    threshold_mib: u64,
    device_mapped: &AtomicBool,
) -> bool {
    let identity = device.identity();
    debug!(device = %device.name(), %identity, "Probing SATA disk");

    let capacity_mib = match probe_capacity_mib(device) {
        Ok(mib) => mib,
        Err(err) => {
            debug!(
                device = %device.name(),
                %err,
                "Failed to estimate drive capacity - it WILL NOT be shimmed"
            );
            return false;
        }
    };

    if capacity_mib > threshold_mib {
        debug!(
            device = %device.name(),
            capacity_mib,
            threshold_mib,
            "Device is over the DOM size limit - it WILL NOT be shimmed"
        );
        return false;
    }

    if device_mapped.load(Ordering::Relaxed) {
        warn!(
            device = %device.name(),
            capacity_mib,
            threshold_mib,
            "Boot device was already shimmed but a new matching device appeared - \
             this may produce unpredictable outcomes! Ignoring - check your hardware"
        );
        return false;
    }

    debug!(
        device = %device.name(),
        capacity_mib,
        threshold_mib,
        "Device is a shimmable target"
    );
    true
}
