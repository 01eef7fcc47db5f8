//! Driver error types.

use crate::config::{CcId, RachLane};
use crate::prach::State;
use thiserror::Error;

/// Result type used throughout the driver.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the PRACH driver.
///
/// Validation failures are detected before any shadow-buffer mutation and
/// never leave partial state behind. [`Error::Transport`] wraps an I/O
/// failure of the register transport; it is fatal to the operation in
/// flight but not to the instance.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation requested from a lifecycle state that does not permit it.
    #[error("operation not permitted in state {state:?}")]
    InvalidState {
        /// The state the instance was in when the operation was requested.
        state: State,
    },

    /// No legal slot or lane allocation exists for the request.
    #[error("no sequence placement for carrier {cc_id} at rate class {rate_class}")]
    CapacityExceeded {
        /// Carrier that could not be placed.
        cc_id: CcId,
        /// Requested sample-rate class.
        rate_class: u8,
    },

    /// The referenced carrier is not enabled or not present in the shadow
    /// sequence.
    #[error("carrier {0} is not present in the shadow configuration")]
    InvalidCarrier(CcId),

    /// The physical detection lane is already bound to another enabled
    /// channel.
    #[error("physical lane {0} is already bound to an enabled channel")]
    LaneInUse(RachLane),

    /// The decimation code is illegal for the carrier's sample-rate class.
    #[error("decimation code {code} unsupported at carrier rate class {rate_class}")]
    UnsupportedDecimation {
        /// Channel decimation-rate code.
        code: u8,
        /// Sample-rate class of the bound carrier.
        rate_class: u8,
    },

    /// The shadow buffer failed a consistency check: a pre-commit
    /// validation, or an operation referencing a channel that is not
    /// enabled there.
    #[error("shadow configuration inconsistent: {0}")]
    InconsistentShadow(String),

    /// Register transport failure.
    #[error("register transport error")]
    Transport(#[from] std::io::Error),

    /// A numeric field violates its documented domain.
    #[error("{field} value {value} out of range")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: u32,
    },
}
