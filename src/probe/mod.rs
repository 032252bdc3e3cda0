//! Low-level capacity probing

pub mod capacity;
pub mod retry;

pub use capacity::probe_capacity_mib;
pub use retry::{RetryBudget, RetryMode};
