//! Probe Interception Engine
//!
//! Wraps the disk driver's probe entry point so that every newly arriving
//! device can be classified, and a matching one gets its identity rewritten
//! to the boot-DOM pair before the real probe ever sees it. The real probe
//! always runs afterwards and its outcome is returned unchanged, so a
//! misclassification can never keep a disk from initializing.

use crate::bus::ScsiBus;
use crate::config::BootMediaConfig;
use crate::error::{Error, Result};
use std::sync::Arc;

#[cfg(feature = "native-sata-dom")]
use crate::bus::{ProbeFn, ProbeOutcome, ScsiDevice};
#[cfg(feature = "native-sata-dom")]
use crate::config::{DeviceClass, DeviceIdentity};
#[cfg(feature = "native-sata-dom")]
use crate::shim::classifier::{is_sata_disk, is_shim_target};
#[cfg(feature = "native-sata-dom")]
use crate::shim::reconcile::reconcile_existing;
#[cfg(feature = "native-sata-dom")]
use parking_lot::Mutex;
#[cfg(feature = "native-sata-dom")]
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(feature = "native-sata-dom")]
use tracing::{debug, error};

/// Name the standard disk driver registers under on the SCSI bus
pub const DISK_DRIVER_NAME: &str = "sd";

// =============================================================================
// Shared Engine State
// =============================================================================

/// State shared between the shim handle, the intercepting probe and the
/// reconciler
///
/// `original_probe` is `Some` exactly while the shim is installed.
/// `device_mapped` is sticky: uninstall never clears it, so a re-register in
/// the same boot session still suppresses double mapping. Both the threshold
/// and the mapped flag are best-effort shared values; install/uninstall
/// transitions must be externally serialized (single-threaded boot-time
/// initialization is assumed).
#[cfg(feature = "native-sata-dom")]
pub(crate) struct ShimShared {
    pub(crate) threshold_mib: AtomicU64,
    pub(crate) original_probe: Mutex<Option<ProbeFn>>,
    pub(crate) device_mapped: AtomicBool,
}

// =============================================================================
// SATA Boot Shim
// =============================================================================

/// Capability handle over the probe-interception engine
///
/// One instance per boot session; `install`/`uninstall` drive the two-state
/// lifecycle. The handle is cheap to clone-share behind an `Arc` but the
/// lifecycle calls themselves are not reentrant.
pub struct SataBootShim {
    #[cfg_attr(not(feature = "native-sata-dom"), allow(dead_code))]
    bus: Arc<dyn ScsiBus>,
    #[cfg(feature = "native-sata-dom")]
    shared: Arc<ShimShared>,
}

#[cfg(feature = "native-sata-dom")]
impl SataBootShim {
    /// Create an engine bound to a host bus, initially uninstalled
    pub fn new(bus: Arc<dyn ScsiBus>) -> Self {
        Self {
            bus,
            shared: Arc::new(ShimShared {
                threshold_mib: AtomicU64::new(0),
                original_probe: Mutex::new(None),
                device_mapped: AtomicBool::new(false),
            }),
        }
    }

    /// Install the shim and reconcile already-enumerated devices
    ///
    /// The intercepting probe is live for all new arrivals once this
    /// returns. Fails without touching any live state.
    pub fn install(&self, config: &BootMediaConfig) -> Result<()> {
        if config.device_class != DeviceClass::Sata {
            error!(class = %config.device_class, "SATA boot shim cannot handle this media class");
            return Err(Error::InvalidConfig {
                class: config.device_class,
            });
        }

        if self.shared.original_probe.lock().is_some() {
            error!("SATA boot shim is already installed");
            return Err(Error::AlreadyInstalled);
        }

        let driver = self
            .bus
            .find_driver(DISK_DRIVER_NAME)
            .ok_or_else(|| Error::DriverNotFound {
                driver: DISK_DRIVER_NAME.to_string(),
            })?;

        // The threshold and the saved probe must be in place before the
        // swap is published: the intercepting probe may run concurrently
        // with bus activity the moment set_probe_fn returns.
        let original = driver.probe_fn();
        self.shared
            .threshold_mib
            .store(config.dom_size_mib, Ordering::Relaxed);
        *self.shared.original_probe.lock() = Some(Arc::clone(&original));

        let shared = Arc::clone(&self.shared);
        let saved = Arc::clone(&original);
        driver.set_probe_fn(Arc::new(move |device| {
            on_device_arrival(&shared, &saved, device)
        }));

        // Devices enumerated before us never hit the intercepting probe;
        // kick the matching ones off their controller so they re-enter it.
        reconcile_existing(&self.shared, driver.as_ref());

        debug!(dom_size_mib = config.dom_size_mib, "SATA boot shim installed");
        Ok(())
    }

    /// Restore the original probe entry point
    ///
    /// The sticky mapped flag survives on purpose: a shimmed device stays
    /// shimmed and a later re-install must not map a second one.
    pub fn uninstall(&self) -> Result<()> {
        let mut slot = self.shared.original_probe.lock();
        let Some(original) = slot.as_ref() else {
            error!("SATA boot shim is not installed");
            return Err(Error::NotInstalled);
        };

        let driver = self
            .bus
            .find_driver(DISK_DRIVER_NAME)
            .ok_or_else(|| Error::DriverNotFound {
                driver: DISK_DRIVER_NAME.to_string(),
            })?;

        driver.set_probe_fn(Arc::clone(original));
        *slot = None;
        self.shared.threshold_mib.store(0, Ordering::Relaxed);

        debug!("SATA boot shim uninstalled");
        Ok(())
    }

    /// Whether the intercepting probe is currently published
    pub fn is_installed(&self) -> bool {
        self.shared.original_probe.lock().is_some()
    }

    /// Whether any device has been mapped this boot session
    pub fn device_mapped(&self) -> bool {
        self.shared.device_mapped.load(Ordering::Relaxed)
    }
}

/// The intercepting probe
///
/// Rewrites identity on a match, then always delegates to the saved
/// original probe so driver initialization completes no matter what we
/// decided.
#[cfg(feature = "native-sata-dom")]
fn on_device_arrival(
    shared: &ShimShared,
    original: &ProbeFn,
    device: &Arc<dyn ScsiDevice>,
) -> ProbeOutcome {
    if !is_sata_disk(device) {
        debug!(
            device = %device.name(),
            "New SCSI device connected - it's not a SATA disk, ignoring"
        );
        return original(device);
    }

    let threshold_mib = shared.threshold_mib.load(Ordering::Relaxed);
    if is_shim_target(device, threshold_mib, &shared.device_mapped) {
        let identity = DeviceIdentity::boot_dom();
        debug!(device = %device.name(), %identity, "Shimming device");
        device.set_identity(identity);
        shared.device_mapped.store(true, Ordering::Relaxed);
    }

    original(device)
}

// =============================================================================
// Stub Build (no boot-DOM support)
// =============================================================================

#[cfg(not(feature = "native-sata-dom"))]
impl SataBootShim {
    /// Create an engine bound to a host bus
    ///
    /// This build has no boot-DOM support; the lifecycle calls always refuse.
    pub fn new(bus: Arc<dyn ScsiBus>) -> Self {
        Self { bus }
    }

    pub fn install(&self, _config: &BootMediaConfig) -> Result<()> {
        tracing::error!(
            "SATA boot shim cannot be installed in a build without SATA DOM support"
        );
        Err(Error::BootDomUnsupported)
    }

    pub fn uninstall(&self) -> Result<()> {
        tracing::error!(
            "SATA boot shim cannot be uninstalled in a build without SATA DOM support"
        );
        Err(Error::BootDomUnsupported)
    }

    pub fn is_installed(&self) -> bool {
        false
    }

    pub fn device_mapped(&self) -> bool {
        false
    }
}
