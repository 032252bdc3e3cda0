//! Existing-Device Reconciler
//!
//! The probe swap only catches devices arriving after install; anything the
//! disk driver bound earlier (usually everything, the driver is rarely
//! modular) never re-enters the probe path on its own. This walks the
//! driver's bus, and every device matching the shim criteria is logically
//! removed and its controller rescanned so it gets re-enumerated through
//! the intercepting probe. Non-matching devices are never touched: the
//! reconciler will not yank a data drive out of the system.

use crate::bus::{DiskDriver, ScanTarget};
use crate::shim::classifier::{is_sata_disk, is_shim_target};
use crate::shim::engine::ShimShared;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

/// Walk every device currently bound to the driver and reconnect the
/// matching ones
///
/// Deliberately consumes the whole sequence instead of stopping at the
/// first match, so a second eligible device later in enumeration order is
/// detected and logged as an anomaly rather than silently ignored.
pub(crate) fn reconcile_existing(shared: &ShimShared, driver: &dyn DiskDriver) {
    let threshold_mib = shared.threshold_mib.load(Ordering::Relaxed);

    for device in driver.devices() {
        if !is_sata_disk(&device) {
            debug!(
                device = %device.name(),
                "Checking existing SCSI device - it's not a SATA disk, ignoring"
            );
            continue;
        }

        // The capacity gets queried again moments later during the re-probe.
        // The driver caches it, but that cache is not reachable through any
        // stable interface at this layer, so the duplication stays.
        if !is_shim_target(&device, threshold_mib, &shared.device_mapped) {
            debug!(device = %device.name(), "Device is not a shim target - ignoring");
            continue;
        }

        let identity = device.identity();
        info!(
            device = %device.name(),
            %identity,
            "Device is already connected - forcefully reconnecting to shim"
        );

        let host = device.host();
        debug!(host_no = host.host_no(), "Removing device from host");
        host.remove_device(&device);

        let target = ScanTarget::wildcard();
        if host.transport_rescan(target) {
            debug!(host_no = host.host_no(), "Triggered template-based rescan");
        } else {
            debug!(host_no = host.host_no(), "Triggering generic rescan");
            host.generic_rescan(target);
        }
    }
}
