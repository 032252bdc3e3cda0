//! Capacity Prober
//!
//! Side-effect-free capacity estimate for a SCSI device, loosely following
//! the disk driver's own capacity negotiation but cutting corners: we only
//! need full mebibytes, rounded down, and we must not touch any driver state
//! because the real probe runs after us and does the full negotiation itself.
//!
//! READ CAPACITY (16) is tried first; drives that predate it answer with
//! ILLEGAL REQUEST and get the READ CAPACITY (10) encoding instead. Busy
//! drives (spinning media behind a bridge, post-reset attention) are retried
//! on a bounded two-mode budget.

use crate::bus::{CommandRequest, CommandStatus, ScsiDevice};
use crate::error::{Error, Result};
use crate::probe::retry::{RetryBudget, RetryMode};
use bytes::Buf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

// =============================================================================
// Command Encodings
// =============================================================================

/// READ CAPACITY (10) opcode
pub const READ_CAPACITY_10: u8 = 0x25;

/// SERVICE ACTION IN (16) opcode
pub const SERVICE_ACTION_IN_16: u8 = 0x9E;

/// READ CAPACITY (16) service action
pub const SAI_READ_CAPACITY_16: u8 = 0x10;

/// READ CAPACITY (16) parameter data length
const RC16_REPLY_LEN: usize = 32;

/// READ CAPACITY (10) parameter data length
const RC10_REPLY_LEN: usize = 8;

/// Data-in buffer size, matching the disk driver's own probe buffer
const CAPACITY_BUF_LEN: usize = 512;

/// Per-command timeout enforced by the transport
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-internal retry count; healthy drives never need even one
const COMMAND_RETRIES: u32 = 5;

const MIB: u64 = 1024 * 1024;

fn read_cap16_request() -> CommandRequest {
    let mut cdb = [0u8; 16];
    cdb[0] = SERVICE_ACTION_IN_16;
    cdb[1] = SAI_READ_CAPACITY_16;
    cdb[13] = RC16_REPLY_LEN as u8;
    CommandRequest {
        cdb,
        data_len: RC16_REPLY_LEN,
        timeout: COMMAND_TIMEOUT,
        retries: COMMAND_RETRIES,
    }
}

fn read_cap10_request() -> CommandRequest {
    let mut cdb = [0u8; 16];
    cdb[0] = READ_CAPACITY_10;
    CommandRequest {
        cdb,
        data_len: RC10_REPLY_LEN,
        timeout: COMMAND_TIMEOUT,
        retries: COMMAND_RETRIES,
    }
}

// =============================================================================
// Capacity Probe
// =============================================================================

/// Estimate the capacity of a device in full mebibytes, rounded down
///
/// Issues READ CAPACITY (16) with a permanent per-call downgrade to
/// READ CAPACITY (10) when the drive rejects the modern encoding. Failures
/// come back as [`Error::CommandHardRefused`], [`Error::CommandRetryExhausted`]
/// or [`Error::AllocationFailure`]; the caller decides what a missing
/// capacity means.
pub fn probe_capacity_mib(device: &Arc<dyn ScsiDevice>) -> Result<u64> {
    probe_capacity_with_budget(device, RetryBudget::default())
}

pub(crate) fn probe_capacity_with_budget(
    device: &Arc<dyn ScsiDevice>,
    mut budget: RetryBudget,
) -> Result<u64> {
    // Some drives only answer the 16-byte variant while older ones only
    // accept the 10-byte one, so a failed modern query is not yet a failure.
    let mut use_cap16 = true;
    let mut data = vec![0u8; CAPACITY_BUF_LEN];

    loop {
        let request = if use_cap16 {
            read_cap16_request()
        } else {
            read_cap10_request()
        };

        let sense = match device.execute(&request, &mut data)? {
            CommandStatus::Ok => break,
            CommandStatus::Failed { sense } => sense,
        };

        let Some(sense) = sense else {
            debug!(device = %device.name(), "Invalid sense - trying again");
            if !budget.acquire(RetryMode::Immediate) {
                return Err(exhausted(device, &budget));
            }
            continue;
        };

        if sense.denies_command() {
            if use_cap16 {
                debug!(
                    device = %device.name(),
                    "Drive rejected READ CAPACITY (16) - downgrading to (10)"
                );
                use_cap16 = false;
                continue;
            }
            error!(device = %device.name(), "Drive refused to provide capacity");
            return Err(Error::CommandHardRefused {
                device: device.name(),
            });
        }

        if sense.reports_busy() {
            debug!(
                device = %device.name(),
                attempts_left = budget.delayed_left(),
                "Drive busy during capacity pre-read - trying again"
            );
            if !budget.acquire(RetryMode::Delayed) {
                return Err(exhausted(device, &budget));
            }
            continue;
        }

        debug!(device = %device.name(), ?sense, "Unrecognized sense - trying again");
        if !budget.acquire(RetryMode::Immediate) {
            return Err(exhausted(device, &budget));
        }
    }

    Ok(parse_capacity_mib(&data, use_cap16))
}

fn exhausted(device: &Arc<dyn ScsiDevice>, budget: &RetryBudget) -> Error {
    let attempts = budget.attempts() + 1;
    error!(
        device = %device.name(),
        attempts,
        "Failed to pre-read drive capacity due to SCSI errors"
    );
    Error::CommandRetryExhausted {
        device: device.name(),
        attempts,
    }
}

/// Extract mebibytes from a READ CAPACITY reply
///
/// u64 arithmetic keeps the product exact well past any real device size.
fn parse_capacity_mib(data: &[u8], cap16: bool) -> u64 {
    let (last_lba, block_size) = if cap16 {
        let mut reply = &data[..RC16_REPLY_LEN];
        (reply.get_u64(), reply.get_u32())
    } else {
        let mut reply = &data[..RC10_REPLY_LEN];
        (u64::from(reply.get_u32()), reply.get_u32())
    };

    (last_lba + 1) * u64::from(block_size) / MIB
}
