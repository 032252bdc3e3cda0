//! Host bus trait seams and descriptor types

pub mod ports;

pub use ports::{
    BusKind, CommandRequest, CommandStatus, DeviceType, DiskDriver, PortKind, ProbeFn,
    ProbeOutcome, ScanTarget, ScsiBus, ScsiDevice, ScsiHost, SenseData, SenseKey,
};
