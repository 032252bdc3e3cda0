//! Scripted fakes for the host bus seams
//!
//! The fake driver keeps a recording probe installed as its "real" probe, so
//! tests can assert what identity the driver would have observed. Rescans
//! are synchronous: removed devices immediately re-enter through the
//! driver's current probe entry, modeling the host re-enumeration the shim
//! relies on.

use crate::bus::{
    CommandRequest, CommandStatus, DeviceType, DiskDriver, PortKind, ProbeFn, ProbeOutcome,
    ScanTarget, ScsiBus, ScsiDevice, ScsiHost, SenseData,
};
use crate::config::DeviceIdentity;
use crate::error::{Error, Result};
use crate::probe::capacity::{READ_CAPACITY_10, SERVICE_ACTION_IN_16};
use crate::shim::DISK_DRIVER_NAME;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

const FAKE_BLOCK_SIZE: u32 = 512;

// =============================================================================
// Scripted Command Replies
// =============================================================================

/// One scripted reply for `FakeDevice::execute`
///
/// When the script runs dry the device answers successfully from its
/// configured capacity, in the layout the CDB opcode asks for.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CmdReply {
    /// Command failure with an optional sense diagnostic
    Fail(Option<SenseData>),
    /// Transport-level buffer allocation failure
    AllocError,
}

// =============================================================================
// Fake Device
// =============================================================================

pub(crate) struct FakeDevice {
    name: String,
    leaf: Mutex<bool>,
    device_type: Mutex<DeviceType>,
    host: Arc<FakeHost>,
    identity: Mutex<DeviceIdentity>,
    capacity_mib: u64,
    replies: Mutex<VecDeque<CmdReply>>,
    issued: Mutex<Vec<u8>>,
}

impl FakeDevice {
    /// Disk on its own single-purpose SATA host
    pub fn standalone(name: &str, capacity_mib: u64) -> Arc<Self> {
        Self::on_host(name, FakeHost::detached(0, PortKind::Sata), capacity_mib)
    }

    /// Disk attached to an existing host
    pub fn on_host(name: &str, host: Arc<FakeHost>, capacity_mib: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            leaf: Mutex::new(true),
            device_type: Mutex::new(DeviceType::Disk),
            host,
            identity: Mutex::new(DeviceIdentity::new("FAKE", "DISK")),
            capacity_mib,
            replies: Mutex::new(VecDeque::new()),
            issued: Mutex::new(Vec::new()),
        })
    }

    pub fn with_identity(self: Arc<Self>, vendor: &str, model: &str) -> Arc<Self> {
        *self.identity.lock() = DeviceIdentity::new(vendor, model);
        self
    }

    pub fn with_type(self: Arc<Self>, device_type: DeviceType) -> Arc<Self> {
        *self.device_type.lock() = device_type;
        self
    }

    pub fn non_leaf(self: Arc<Self>) -> Arc<Self> {
        *self.leaf.lock() = false;
        self
    }

    pub fn push_reply(&self, reply: CmdReply) {
        self.replies.lock().push_back(reply);
    }

    pub fn current_identity(&self) -> DeviceIdentity {
        self.identity.lock().clone()
    }

    /// Opcodes of every command issued against this device, in order
    pub fn issued_opcodes(&self) -> Vec<u8> {
        self.issued.lock().clone()
    }

    pub fn as_scsi(self: &Arc<Self>) -> Arc<dyn ScsiDevice> {
        Arc::clone(self) as Arc<dyn ScsiDevice>
    }

    pub fn fake_host(&self) -> Arc<FakeHost> {
        Arc::clone(&self.host)
    }

    fn answer_capacity(&self, cdb0: u8, data: &mut [u8]) {
        let blocks = self.capacity_mib * (1024 * 1024 / u64::from(FAKE_BLOCK_SIZE));
        let last_lba = blocks - 1;
        match cdb0 {
            SERVICE_ACTION_IN_16 => {
                data[..8].copy_from_slice(&last_lba.to_be_bytes());
                data[8..12].copy_from_slice(&FAKE_BLOCK_SIZE.to_be_bytes());
            }
            READ_CAPACITY_10 => {
                data[..4].copy_from_slice(&(last_lba as u32).to_be_bytes());
                data[4..8].copy_from_slice(&FAKE_BLOCK_SIZE.to_be_bytes());
            }
            other => panic!("fake device got unexpected opcode {other:#x}"),
        }
    }
}

impl ScsiDevice for FakeDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn is_leaf(&self) -> bool {
        *self.leaf.lock()
    }

    fn device_type(&self) -> DeviceType {
        *self.device_type.lock()
    }

    fn host(&self) -> Arc<dyn ScsiHost> {
        Arc::clone(&self.host) as Arc<dyn ScsiHost>
    }

    fn identity(&self) -> DeviceIdentity {
        self.identity.lock().clone()
    }

    fn set_identity(&self, identity: DeviceIdentity) {
        *self.identity.lock() = identity;
    }

    fn execute(&self, request: &CommandRequest, data: &mut [u8]) -> Result<CommandStatus> {
        self.issued.lock().push(request.cdb[0]);
        match self.replies.lock().pop_front() {
            Some(CmdReply::Fail(sense)) => Ok(CommandStatus::Failed { sense }),
            Some(CmdReply::AllocError) => Err(Error::AllocationFailure),
            None => {
                self.answer_capacity(request.cdb[0], data);
                Ok(CommandStatus::Ok)
            }
        }
    }
}

// =============================================================================
// Fake Host
// =============================================================================

pub(crate) struct FakeHost {
    host_no: u32,
    port_kind: PortKind,
    transport_hook: Mutex<bool>,
    driver: Mutex<Weak<FakeDriver>>,
    removed: Mutex<Vec<Arc<dyn ScsiDevice>>>,
    rescans: Mutex<Vec<String>>,
}

impl FakeHost {
    /// Host not yet linked to a driver; linking happens on preload/hotplug
    pub fn detached(host_no: u32, port_kind: PortKind) -> Arc<Self> {
        Arc::new(Self {
            host_no,
            port_kind,
            transport_hook: Mutex::new(true),
            driver: Mutex::new(Weak::new()),
            removed: Mutex::new(Vec::new()),
            rescans: Mutex::new(Vec::new()),
        })
    }

    /// Drop the transport template hook so rescans take the generic path
    pub fn disable_transport_hook(&self) {
        *self.transport_hook.lock() = false;
    }

    /// Rescan kinds triggered on this host, in order
    pub fn rescans(&self) -> Vec<String> {
        self.rescans.lock().clone()
    }

    fn link(&self, driver: &Arc<FakeDriver>) {
        *self.driver.lock() = Arc::downgrade(driver);
    }

    fn reenumerate_removed(&self) {
        let Some(driver) = self.driver.lock().upgrade() else {
            return;
        };
        let removed: Vec<_> = self.removed.lock().drain(..).collect();
        for device in removed {
            driver.readd_and_probe(device);
        }
    }
}

impl ScsiHost for FakeHost {
    fn host_no(&self) -> u32 {
        self.host_no
    }

    fn port_kind(&self) -> PortKind {
        self.port_kind
    }

    fn remove_device(&self, device: &Arc<dyn ScsiDevice>) {
        if let Some(driver) = self.driver.lock().upgrade() {
            driver.forget(device);
        }
        self.removed.lock().push(Arc::clone(device));
    }

    fn transport_rescan(&self, _target: ScanTarget) -> bool {
        if !*self.transport_hook.lock() {
            return false;
        }
        self.rescans.lock().push("transport".to_string());
        self.reenumerate_removed();
        true
    }

    fn generic_rescan(&self, _target: ScanTarget) {
        self.rescans.lock().push("generic".to_string());
        self.reenumerate_removed();
    }
}

// =============================================================================
// Fake Driver
// =============================================================================

pub(crate) struct FakeDriver {
    probe: Mutex<ProbeFn>,
    devices: Mutex<Vec<Arc<dyn ScsiDevice>>>,
    probed: Arc<Mutex<Vec<(String, DeviceIdentity)>>>,
    removals: Mutex<Vec<String>>,
}

impl FakeDriver {
    fn new() -> Arc<Self> {
        let probed: Arc<Mutex<Vec<(String, DeviceIdentity)>>> = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&probed);
        let base_probe: ProbeFn = Arc::new(move |device| {
            recorder.lock().push((device.name(), device.identity()));
            ProbeOutcome::Bound
        });
        Arc::new(Self {
            probe: Mutex::new(base_probe),
            devices: Mutex::new(Vec::new()),
            probed,
            removals: Mutex::new(Vec::new()),
        })
    }

    /// Add a device as if it had been bound before the shim installed
    pub fn preload(self: &Arc<Self>, device: &Arc<FakeDevice>) {
        device.fake_host().link(self);
        self.devices.lock().push(device.as_scsi());
    }

    /// Deliver a device arrival through the current probe entry
    pub fn hotplug(self: &Arc<Self>, device: &Arc<FakeDevice>) -> ProbeOutcome {
        device.fake_host().link(self);
        let scsi = device.as_scsi();
        self.devices.lock().push(Arc::clone(&scsi));
        let probe = self.probe.lock().clone();
        probe(&scsi)
    }

    /// Every (name, identity) pair the base probe observed, in order
    pub fn probed(&self) -> Vec<(String, DeviceIdentity)> {
        self.probed.lock().clone()
    }

    /// Names of devices logically removed from the bus, in order
    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().clone()
    }

    fn forget(&self, device: &Arc<dyn ScsiDevice>) {
        let name = device.name();
        self.devices.lock().retain(|d| d.name() != name);
        self.removals.lock().push(name);
    }

    fn readd_and_probe(self: &Arc<Self>, device: Arc<dyn ScsiDevice>) {
        self.devices.lock().push(Arc::clone(&device));
        let probe = self.probe.lock().clone();
        probe(&device);
    }
}

impl DiskDriver for FakeDriver {
    fn name(&self) -> &str {
        DISK_DRIVER_NAME
    }

    fn probe_fn(&self) -> ProbeFn {
        self.probe.lock().clone()
    }

    fn set_probe_fn(&self, probe: ProbeFn) {
        *self.probe.lock() = probe;
    }

    fn devices(&self) -> Box<dyn Iterator<Item = Arc<dyn ScsiDevice>> + '_> {
        // Snapshot so callers can remove devices mid-iteration
        let snapshot = self.devices.lock().clone();
        Box::new(snapshot.into_iter())
    }
}

// =============================================================================
// Fake Bus
// =============================================================================

pub(crate) struct FakeBus {
    driver: Option<Arc<FakeDriver>>,
}

impl FakeBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            driver: Some(FakeDriver::new()),
        })
    }

    /// Bus with no disk driver registered at all
    pub fn without_driver() -> Arc<Self> {
        Arc::new(Self { driver: None })
    }

    pub fn driver(&self) -> Arc<FakeDriver> {
        Arc::clone(self.driver.as_ref().expect("fake bus has no driver"))
    }

    pub fn as_scsi_bus(self: &Arc<Self>) -> Arc<dyn ScsiBus> {
        Arc::clone(self) as Arc<dyn ScsiBus>
    }
}

impl ScsiBus for FakeBus {
    fn find_driver(&self, name: &str) -> Option<Arc<dyn DiskDriver>> {
        match &self.driver {
            Some(driver) if name == driver.name() => {
                Some(Arc::clone(driver) as Arc<dyn DiskDriver>)
            }
            _ => None,
        }
    }
}
